//! kp Core - Foundational Types
//!
//! Error taxonomy, execution mode, configuration file, and the resource
//! documents that relocation results are written into.

pub mod config;
pub mod error;
pub mod mode;
pub mod resource;

// Re-export commonly used types
pub use config::{KpConfig, RegistryOptions};
pub use error::{ErrorKind, KpError, Result};
pub use mode::ExecutionMode;
pub use resource::{LifecycleImage, StackImages, StoreImage, StoreSources};

/// kp version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
