use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read Rolo config {path:?}: {source}.")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Rolo config {path:?} is not valid TOML: {source}.")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	/// A rule in `validate` rejected the config. The message names the offending key.
	#[error("{message}")]
	Validation { message: String },
}
