//! HTTP surface over a [`kvscope_registry::StoreRegistry`].
//!
//! Routes requests to a registry lookup followed by a point operation or a
//! key page scan. The router holds no store state of its own.

pub mod server;

pub use server::{
    bind_listener, build_router, serve, start_server, ApiError, AppState, DEFAULT_MAX_BODY_BYTES,
};
