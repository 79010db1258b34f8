#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("failed to create storage root: {0}")]
    RootDirCreation(std::io::Error),
    #[error("failed to create date bucket: {0}")]
    BucketDirCreation(std::io::Error),
    #[error("failed to write stored file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read stored file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to read storage directory: {0}")]
    DirRead(std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
