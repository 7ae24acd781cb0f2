//! Core type aliases and re-exports

pub use glam::{Mat4, UVec3, Vec3};

/// Standard Result type for session operations
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
