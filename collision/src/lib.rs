//! Spatial collision index: a quadtree over entity bounding rectangles with
//! lazy revalidation and a deferred-mutation wrapper for use during
//! iteration.

pub mod detector;
pub mod error;
pub mod intersect;
pub mod rect;
pub mod tree;

pub use detector::CollisionDetector;
pub use error::CollisionError;
pub use intersect::{mesh_intersects, triangles_intersect, Triangle};
pub use rect::{Point, Rect};
pub use tree::{CollisionSource, CollisionTree, SPLIT_THRESHOLD};
