use thiserror::Error;

/// Error taxonomy for every storage operation in this crate.
///
/// Validation failures at the CLI boundary never reach this type; everything
/// that does is mapped to a distinct process exit code by the binary.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Missing or malformed configuration: bad account/container names,
    /// absent account key where one is required.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid key material or a signing failure.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Local file access failure (file not found, unreadable, short read).
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered the transfer with a non-created status.
    #[error("upload rejected by server: HTTP {status}")]
    UploadRejected { status: u16 },

    /// The HTTP transport failed before a status code was obtained.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
