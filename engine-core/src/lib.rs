//! Entity graph, transform cache, and collision/audio glue for a 2-D
//! scripted scene engine. See `collision` for the spatial index and
//! `audio-system` for the mixer this crate's layers carry audio state for.

pub mod entity;
pub mod error;
pub mod mesh;
pub mod scene;
pub mod transform;

pub use entity::{EntityArena, EntityKey, Pose};
pub use error::EngineError;
pub use mesh::Mesh;
pub use scene::{Layer, LayerStack};
pub use transform::Transform2D;
