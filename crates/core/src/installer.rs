//! Application-facing queries against the installer object.

use std::sync::Arc;

use dinstaller_protocol::names::method;
use dinstaller_protocol::{
    Disk, FromVariant, IntoVariant, InstallerStatus, Language, LanguageMap, MountAssignment,
    OptionValue, Product,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::remote::RemoteObject;
use crate::status::StatusWatcher;
use crate::transport::WebSocketTransport;

/// Typed access to the installer: products, languages, storage, options and status.
#[derive(Clone)]
pub struct InstallerClient {
    object: RemoteObject,
    status: StatusWatcher,
}

impl InstallerClient {
    pub fn new(connection: Arc<Connection>) -> Self {
        let object = RemoteObject::installer(connection);
        Self {
            status: StatusWatcher::new(object.clone()),
            object,
        }
    }

    /// Opens the bus WebSocket from `config` and starts the connection loop.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let (transport, message_rx) = WebSocketTransport::connect(&config.bus_url).await?;
        let connection = Connection::new(transport.into_transport_parts(message_rx))
            .with_request_timeout(config.request_timeout());
        let connection = Arc::new(connection);
        connection.start();
        Ok(Self::new(connection))
    }

    pub fn object(&self) -> &RemoteObject {
        &self.object
    }

    pub fn status(&self) -> &StatusWatcher {
        &self.status
    }

    pub async fn get_status(&self) -> Result<InstallerStatus> {
        self.status.get_status().await
    }

    /// Product catalog in the order the installer lists it.
    pub async fn get_products(&self) -> Result<Vec<Product>> {
        self.fetch(method::GET_PRODUCTS).await
    }

    /// Languages as `{id, name}` pairs, ordered by language code.
    pub async fn get_languages(&self) -> Result<Vec<Language>> {
        let languages: LanguageMap = self.fetch(method::GET_LANGUAGES).await?;
        languages
            .iter()
            .map(|(code, fields)| {
                Language::from_entry(code, fields)
                    .ok_or_else(|| Error::UnexpectedReply(format!("language {code} has no name")))
            })
            .collect()
    }

    pub async fn get_disks(&self) -> Result<Vec<Disk>> {
        self.fetch(method::GET_DISKS).await
    }

    /// Storage proposal; the order is the mount plan and is kept as received.
    pub async fn get_storage(&self) -> Result<Vec<MountAssignment>> {
        self.fetch(method::GET_STORAGE).await
    }

    /// Selects the product to install.
    pub async fn select_product(&self, name: &str) -> Result<()> {
        self.object.call(method::SELECT_PRODUCT, vec![Value::from(name)]).await?;
        Ok(())
    }

    /// Asks the installer to start. Progress is observed through status changes.
    pub async fn start_installation(&self) -> Result<()> {
        self.object.call(method::START, vec![]).await?;
        Ok(())
    }

    pub async fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.object.get_option(name).await
    }

    pub async fn get_option_as<T: FromVariant>(&self, name: &str) -> Option<T> {
        self.object.get_option_as(name).await
    }

    pub async fn set_option(&self, name: &str, value: impl IntoVariant) -> Result<()> {
        self.object.set_option(name, value).await
    }

    async fn fetch<T: DeserializeOwned>(&self, method: &str) -> Result<T> {
        let reply = self.object.call(method, vec![]).await?;
        let first = reply
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedReply(format!("empty reply to {method}")))?;
        Ok(serde_json::from_value(first)?)
    }
}

#[cfg(test)]
mod tests {
    use dinstaller_protocol::names;
    use serde_json::json;

    use super::*;
    use crate::transport::{FakeTransportBuilder, FakeTransportController};

    fn products() -> Value {
        json!([
            {"name": "MicroOS", "display_name": "openSUSE MicroOS"},
            {"name": "Tumbleweed", "display_name": "openSUSE Tumbleweed"}
        ])
    }

    fn proposal() -> Value {
        json!([
            {"mount": "/", "device": "/dev/sdb2", "type": "btrfs", "size": "117354528768"},
            {"mount": "/boot/efi", "device": "/dev/sdb1", "type": "vfat", "size": "536870912"},
            {"mount": "swap", "device": "/dev/sdb3", "type": "swap", "size": "2147483648"}
        ])
    }

    fn installer() -> (InstallerClient, FakeTransportController) {
        let (parts, controller) = FakeTransportBuilder::new()
            .with_responder(|call| {
                let on_installer = call.path == names::INSTALLER_PATH
                    && call.interface == names::INSTALLER_INTERFACE;
                if !on_installer {
                    return Err(dinstaller_protocol::ErrorPayload {
                        name: names::error::UNKNOWN_OBJECT.into(),
                        message: call.path.clone(),
                    });
                }
                let reply = match call.method.as_str() {
                    "GetStatus" => json!(0),
                    "GetProducts" => products(),
                    "GetLanguages" => json!({
                        "en_US": ["English (US)", "English (US)", ".UTF-8", "", "English (US)"],
                        "cs_CZ": ["Cestina", "Cestina", ".UTF-8", "", "Checo"]
                    }),
                    "GetDisks" => {
                        json!([{"name": "/dev/sda", "model": "Some Brand", "size": "0.5TiB"}])
                    }
                    "GetStorage" => proposal(),
                    _ => return Ok(vec![]),
                };
                Ok(vec![reply])
            })
            .build();
        let connection = Arc::new(Connection::new(parts));
        connection.start();
        (InstallerClient::new(connection), controller)
    }

    #[tokio::test]
    async fn returns_installer_status() {
        let (client, _controller) = installer();
        assert_eq!(client.get_status().await.unwrap(), InstallerStatus::IDLE);
    }

    #[tokio::test]
    async fn returns_products_in_catalog_order() {
        let (client, _controller) = installer();
        let products = client.get_products().await.unwrap();
        assert_eq!(
            products,
            vec![
                Product::new("MicroOS", "openSUSE MicroOS"),
                Product::new("Tumbleweed", "openSUSE Tumbleweed")
            ]
        );
    }

    #[tokio::test]
    async fn projects_languages_to_id_and_name() {
        let (client, _controller) = installer();
        let languages = client.get_languages().await.unwrap();
        assert_eq!(
            languages,
            vec![
                Language {
                    id: "cs_CZ".into(),
                    name: "Cestina".into()
                },
                Language {
                    id: "en_US".into(),
                    name: "English (US)".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn returns_disks() {
        let (client, _controller) = installer();
        let disks = client.get_disks().await.unwrap();
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].model, "Some Brand");
    }

    #[tokio::test]
    async fn keeps_storage_proposal_order() {
        let (client, _controller) = installer();
        let storage = client.get_storage().await.unwrap();
        let mounts: Vec<&str> = storage.iter().map(|entry| entry.mount.as_str()).collect();
        assert_eq!(mounts, ["/", "/boot/efi", "swap"]);
        assert_eq!(serde_json::to_value(&storage).unwrap(), proposal());
    }

    #[tokio::test]
    async fn start_calls_start_without_arguments() {
        let (client, controller) = installer();
        client.start_installation().await.unwrap();

        let calls = controller.sent_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, names::INSTALLER_PATH);
        assert_eq!(calls[0].interface, names::INSTALLER_INTERFACE);
        assert_eq!(calls[0].method, "Start");
        assert!(calls[0].args.is_empty());
    }

    #[tokio::test]
    async fn start_failure_propagates() {
        let (parts, _controller) = FakeTransportBuilder::new().failing_sends().build();
        let connection = Arc::new(Connection::new(parts));
        connection.start();

        let err = InstallerClient::new(connection).start_installation().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn short_language_tuple_is_rejected() {
        let (parts, _controller) = FakeTransportBuilder::new()
            .with_responder(|_| Ok(vec![json!({"xx_XX": ["only code"]})]))
            .build();
        let connection = Arc::new(Connection::new(parts));
        connection.start();

        let err = InstallerClient::new(connection).get_languages().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply(_)));
    }
}
