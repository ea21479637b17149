//! Registry of named key-value stores.
//!
//! Each store is reachable under a short, human-chosen name. Stores opened by
//! the registry from a path are owned and closed on shutdown; stores attached
//! as pre-opened handles belong to the caller and are never closed here.

pub mod errors;
pub mod registry;
pub mod types;

pub use errors::*;
pub use registry::StoreRegistry;
pub use types::*;
