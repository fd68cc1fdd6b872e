//! opsgate HTTP server.
//!
//! A bearer-authenticated backend that funds a credit balance by settling a
//! billing-issued payment intent on chain, and forwards marketplace offers,
//! listings and auctions to an order service.
//!
//! # Modules
//!
//! - [`config`] - Server configuration with environment variable expansion
//! - [`error`] - JSON error responses
//! - [`gate`] - Bearer token middleware
//! - [`handlers`] - Route handlers and router builder

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;

pub use config::{ConfigError, Credentials, ServerConfig};
pub use error::ApiError;
pub use gate::BearerToken;
pub use handlers::{AppState, SharedState, router};
