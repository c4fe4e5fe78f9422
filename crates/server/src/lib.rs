//! # Gatehouse server
//!
//! The HTTP boundary in front of the gate. Every request passes, in order:
//!
//! 1. **Admission**: a fixed-window quota keyed by peer address
//! 2. **Authentication**: bearer token verification and identity resolution
//! 3. **Resource load**: the addressed post or user, when the route has one
//! 4. **Authorization**: ownership, then role precedence
//!
//! Each stage leaves a typed value in the request context (see [`context`])
//! and any failure ends the request with a single `{"error": ...}` response.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Configuration loading and validation.
pub mod config;
/// Typed request context.
pub mod context;
/// HTTP error mapping.
pub mod error;
/// The ordered request gate.
pub mod gate;
/// Route handlers.
pub mod handlers;
/// Gate stages as middleware.
pub mod middleware;
/// Resource collaborators.
pub mod resources;
/// Route table.
pub mod router;
/// Demo data.
pub mod seed;
/// Server lifecycle.
pub mod serve;
/// Shared application state.
pub mod state;

pub use config::{ConfigLoadError, ServerConfig};
pub use error::ApiError;
pub use gate::Gate;
pub use router::router;
pub use serve::{ServeHandle, serve};
pub use state::AppState;
