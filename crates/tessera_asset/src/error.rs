use crate::AssetId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0} not found")]
    NotFound(AssetId),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{path}` is not valid UTF-8")]
    InvalidUtf8 { path: String },

    #[error("error parsing JSON from {id} at {line}:{column}: {message}")]
    Parse {
        id: AssetId,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("import cycle detected at {0}")]
    ImportCycle(AssetId),

    #[error("asset {0} is cached with a different type")]
    WrongType(AssetId),

    #[error("invalid asset {id}: {message}")]
    Invalid { id: AssetId, message: String },
}

impl AssetError {
    pub fn parse(id: &AssetId, err: &serde_json::Error) -> Self {
        AssetError::Parse {
            id: id.clone(),
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }

    pub fn invalid(id: &AssetId, message: impl Into<String>) -> Self {
        AssetError::Invalid {
            id: id.clone(),
            message: message.into(),
        }
    }
}
