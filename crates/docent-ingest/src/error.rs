use crate::convert::ConvertError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to extract {file}: {message}")]
    Extraction { file: String, message: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown encoding label: {0}")]
    UnknownEncoding(String),

    #[error("invalid extraction options: {0}")]
    InvalidOptions(String),

    #[error("document converter is not available")]
    ConverterUnavailable,

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),
}

impl IngestError {
    pub(crate) fn extraction(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Extraction {
            file: file.into(),
            message: message.to_string(),
        }
    }
}
