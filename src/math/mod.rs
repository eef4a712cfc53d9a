//! Mathematical utilities

pub mod aabb;
pub mod morton;

pub use aabb::Aabb;
pub use morton::{encode_morton_3d, decode_morton_3d};
