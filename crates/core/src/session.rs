//! Session gateway authentication.
//!
//! The gateway brokers access to the installer bus. Logging in is a single
//! request to its login endpoint carrying HTTP basic credentials plus a hint
//! asking for administrative access; probing the same endpoint without
//! credentials tells whether a session already exists.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Requests administrative privileges for the new session.
pub const SUPERUSER_HEADER: &str = "X-Superuser";
const SUPERUSER_ANY: &str = "any";

/// Status line and body of a gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    /// Reason phrase as sent by the gateway.
    pub status_text: String,
    pub body: String,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Pending [`Gateway`] request.
pub type GatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<GatewayResponse>> + Send + 'a>>;

/// HTTP-like access to the session gateway.
pub trait Gateway: Send + Sync {
    fn get<'a>(&'a self, path: &'a str, headers: &'a [(&'static str, String)]) -> GatewayFuture<'a>;
}

/// [`Gateway`] over HTTP(S) with `reqwest`.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid gateway URL {base_url}: {e}")))?;
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.gateway_url, config.request_timeout())
    }
}

impl Gateway for HttpGateway {
    fn get<'a>(
        &'a self,
        path: &'a str,
        headers: &'a [(&'static str, String)],
    ) -> GatewayFuture<'a> {
        Box::pin(async move {
            let url = self
                .base_url
                .join(path)
                .map_err(|e| Error::Config(format!("invalid login path {path}: {e}")))?;
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(*name, value.as_str());
            }

            let response = request.send().await?;
            let status = response.status();
            let status_text = response
                .extensions()
                .get::<hyper::ext::ReasonPhrase>()
                .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            let body = response.text().await?;

            Ok(GatewayResponse {
                status: status.as_u16(),
                status_text,
                body,
            })
        })
    }
}

/// Last known session outcome; never refreshed on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<String>,
}

#[derive(Deserialize)]
struct LoginInfo {
    user: Option<String>,
}

/// Logs into the session gateway and probes the current session.
pub struct SessionAuthenticator<G = HttpGateway> {
    gateway: G,
    login_path: String,
    session: Mutex<Session>,
}

impl SessionAuthenticator<HttpGateway> {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(HttpGateway::from_config(config)?, config.login_path.clone()))
    }
}

impl<G: Gateway> SessionAuthenticator<G> {
    pub fn new(gateway: G, login_path: impl Into<String>) -> Self {
        Self {
            gateway,
            login_path: login_path.into(),
            session: Mutex::new(Session::default()),
        }
    }

    /// Logs in as `username`.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`] with the gateway's status text when the
    /// credentials are rejected; transport errors propagate as they are.
    pub async fn authorize(&self, username: &str, secret: &str) -> Result<()> {
        let credential = BASE64.encode(format!("{username}:{secret}"));
        let headers = [
            (AUTHORIZATION_HEADER, format!("Basic {credential}")),
            (SUPERUSER_HEADER, SUPERUSER_ANY.to_string()),
        ];

        let response = self.gateway.get(&self.login_path, &headers).await?;
        if response.is_success() {
            tracing::info!(target = "dinstaller.session", user = %username, "authenticated");
            *self.session.lock() = Session {
                authenticated: true,
                user: Some(username.to_string()),
            };
            Ok(())
        } else {
            tracing::warn!(
                target = "dinstaller.session",
                user = %username,
                status = response.status,
                reason = %response.status_text,
                "authentication rejected"
            );
            *self.session.lock() = Session::default();
            Err(Error::Authentication(response.status_text))
        }
    }

    /// Whether the gateway accepts the current session.
    ///
    /// A missing session is a normal outcome; transport failures count as logged out.
    pub async fn is_logged_in(&self) -> bool {
        let logged_in = match self.gateway.get(&self.login_path, &[]).await {
            Ok(response) => response.is_success(),
            Err(err) => {
                tracing::debug!(
                    target = "dinstaller.session",
                    error = %err,
                    "session check failed"
                );
                false
            }
        };
        let mut session = self.session.lock();
        session.authenticated = logged_in;
        if !logged_in {
            session.user = None;
        }
        logged_in
    }

    /// Name of the logged-in user as reported by the gateway.
    pub async fn current_user(&self) -> Result<String> {
        let response = self.gateway.get(&self.login_path, &[]).await?;
        if !response.is_success() {
            return Err(Error::Authentication(response.status_text));
        }

        let reported = serde_json::from_str::<LoginInfo>(&response.body)
            .ok()
            .and_then(|info| info.user);
        reported
            .or_else(|| self.session.lock().user.clone())
            .ok_or_else(|| Error::UnexpectedReply("gateway did not report the session user".into()))
    }

    /// Snapshot of the last known outcome.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }
}
