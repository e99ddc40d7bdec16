//! Shared types for the tilenav crates: the error type, math helpers and
//! the triangle mesh used as build input.

mod math;
mod mesh;

pub use math::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("recast error: {0}")]
    Recast(String),

    #[error("detour error: {0}")]
    Detour(String),

    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tilenav operations
pub type Result<T> = std::result::Result<T, Error>;
