use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
	#[error(transparent)]
	Client(#[from] dinstaller::Error),

	#[error("Invalid value {value:?} for type '{tag}'")]
	InvalidValue { tag: String, value: String },

	#[error("Option {0} is not available")]
	OptionUnavailable(String),

	#[error("No password given")]
	MissingPassword,

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
