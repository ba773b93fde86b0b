use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("entity is not tracked by this tree")]
    NotTracked,
    #[error("root rectangle must have positive width and height")]
    InvalidArgument,
}
