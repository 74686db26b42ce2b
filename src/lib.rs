//! SparseVFS: Git Index Projection and Virtualization Core
//!
//! Projects a git index into an in-memory working tree and dispatches
//! filesystem virtualization callbacks against it, so placeholders and file
//! content are produced on demand instead of checked out up front.

pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod platform;
pub mod projection;
pub mod types;
pub mod virtualization;

pub use crate::config::{ConfigLoader, VirtualizationConfig};
pub use crate::error::{AdmissionError, ConfigError, IndexError, ProjectionError};
pub use crate::projection::{IndexProjection, IndexSource, Lookup};
pub use crate::virtualization::FileSystemVirtualizer;
