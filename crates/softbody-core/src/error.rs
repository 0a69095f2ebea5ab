//! Error types for the soft-body engine.
//!
//! Load, embedding and setup operations return `SimResult<T>`. The per-step
//! passes are infallible.

use thiserror::Error;

/// Unified error type for mesh loading, embedding and solver setup.
#[derive(Debug, Error)]
pub enum SimError {
    /// The mesh specification does not have exactly one node and one element block.
    #[error("mesh [{mesh}]: unsupported entity block count ({nodes} node, {elements} element blocks)")]
    UnsupportedBlockCount {
        mesh: String,
        nodes: usize,
        elements: usize,
    },

    /// Elements are neither 3-node triangles nor 4-node tetrahedra.
    #[error("mesh [{mesh}]: unsupported element type (dimension {dim}, {nodes} nodes)")]
    UnsupportedElementType { mesh: String, dim: u32, nodes: usize },

    /// Connectivity or node data is truncated or inconsistent.
    #[error("mesh [{mesh}]: missing indices ({detail})")]
    MissingIndices { mesh: String, detail: String },

    /// A node tag referenced by an element, static set or attachment does not exist.
    #[error("mesh [{mesh}]: unknown node tag {tag}")]
    UnknownNodeTag { mesh: String, tag: u64 },

    /// A mesh with this name was already loaded.
    #[error("mesh [{0}] is already loaded")]
    DuplicateMesh(String),

    /// No mesh with this name was loaded.
    #[error("mesh [{0}] is not loaded")]
    UnknownMesh(String),

    /// A visual vertex has no enclosing or nearby element.
    #[error("failed to embed mesh [{mesh}]: vertex {vertex} too far away")]
    EmbeddingFailed { mesh: String, vertex: usize },

    /// No group dimensions satisfy the device limits.
    #[error("failed to find supported group dimensions: {0}")]
    Dispatch(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
