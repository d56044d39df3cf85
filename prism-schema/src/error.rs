use camino::Utf8PathBuf;

/// Fatal problems with the selected schema set. These abort a run before any
/// dataset file is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown schema version '{version}' (available: {})", .available.join(", "))]
    UnknownVersion {
        version: String,
        available: Vec<String>,
    },

    #[error("schema {version}/{name} is not valid JSON: {source}")]
    SchemaParse {
        version: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema {version}/{name} does not compile: {message}")]
    SchemaCompile {
        version: String,
        name: String,
        message: String,
    },

    #[error("schema {version}/{name}: {message}")]
    InvalidSchema {
        version: String,
        name: String,
        message: String,
    },

    #[error("cannot read schema directory {path}: {message}")]
    SchemaDir { path: Utf8PathBuf, message: String },
}

impl ConfigurationError {
    pub fn is_unknown_version(&self) -> bool {
        matches!(self, ConfigurationError::UnknownVersion { .. })
    }
}
