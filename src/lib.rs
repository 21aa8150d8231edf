#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod flow;
pub mod pages;
pub mod principal;
pub mod provider;
pub mod routes;
pub mod session;

// Re-exports for convenient access
pub use config::{AppConfig, ProviderConfig};
pub use error::AuthError;
pub use flow::AuthFlow;
pub use principal::{Principal, RawClaims};
pub use provider::{AccessToken, IdentityProvider, ProviderClient, ProviderError};
pub use routes::{build_router, RouterConfig};
pub use session::{MemoryStore, Session, SessionId, SessionStore};
