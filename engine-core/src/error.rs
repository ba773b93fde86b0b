use thiserror::Error;

/// Error hierarchy for the scene engine core. Crate-local errors in
/// `audio-system`, `asset-manager`, and `audio-backend` wrap a collaborator
/// failure (cpal, symphonia) locally and convert into this type at the
/// boundary the host actually observes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("index out of range")]
    InvalidIndex,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("filesystem error: {0}")]
    FileSystemError(String),
    #[error("decode error: {0}")]
    DecodeError(String),
    #[error("buffer not ready yet")]
    DecodePending,
    #[error("clip fully decoded")]
    FullyDecoded,
    #[error("decoder cannot seek")]
    CantSeek,
    #[error("seek failed: {0}")]
    SeekError(String),
    #[error("synchronization error: {0}")]
    SyncError(String),
    #[error("buffer full")]
    BufferFull,
    #[error("no video mode set")]
    NoVideoModeSet,
    #[error("no active layer")]
    NoActiveLayer,
    #[error("entity not found")]
    EntityNotFound,
}

impl From<collision::CollisionError> for EngineError {
    fn from(err: collision::CollisionError) -> Self {
        match err {
            collision::CollisionError::NotTracked => EngineError::EntityNotFound,
            collision::CollisionError::InvalidArgument => EngineError::InvalidArgument("collision root rectangle".to_string()),
        }
    }
}

impl From<deferred_list::DeferredListError> for EngineError {
    fn from(err: deferred_list::DeferredListError) -> Self {
        match err {
            deferred_list::DeferredListError::InvalidIndex(_) => EngineError::InvalidIndex,
        }
    }
}

impl From<asset_manager::AssetError> for EngineError {
    fn from(err: asset_manager::AssetError) -> Self {
        match err {
            asset_manager::AssetError::Io(e) => EngineError::FileSystemError(e.to_string()),
            asset_manager::AssetError::NotFound(path) => EngineError::FileSystemError(path),
            asset_manager::AssetError::Decode(msg) => EngineError::DecodeError(msg),
            asset_manager::AssetError::CantSeek => EngineError::CantSeek,
            asset_manager::AssetError::Seek(msg) => EngineError::SeekError(msg),
        }
    }
}
