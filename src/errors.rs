use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PERMISSION_DENIED: {0}")]
    PermissionDenied(String),
    #[error("NO_DIRECTORY_SELECTED: no notes directory has been selected")]
    NoDirectorySelected,
    #[error("NOTE_NOT_FOUND: {0}")]
    NoteNotFound(String),
    #[error("SECTION_NOT_FOUND: {0}")]
    SectionNotFound(String),
    #[error("CORRUPT_NOTE_FILE: {0}")]
    CorruptNoteFile(String),
    #[error("INVALID_IMAGE_DATA: {0}")]
    InvalidImageData(String),
    #[error("UNSUPPORTED_ENVIRONMENT: {0}")]
    UnsupportedEnvironment(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(value.to_string()),
            _ => Self::Io(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
