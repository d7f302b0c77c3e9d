//! Device-side authentication for a cloud messaging hub.
//!
//! The centre of the crate is [`TokenRefreshCredential`], which caches a shared
//! access token and regenerates it through a pluggable [`TokenGenerator`] once the
//! token enters its refresh buffer. At most one generation runs per credential.

pub mod auth_context;
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod token;

pub use auth_context::DeviceAuthContext;
pub use config::{ConfigLocation, DeviceConfig, read_config};
pub use errors::{Error, Result};
pub use token::{
    EdgeWorkloadTokenGenerator, RefreshPolicy, SharedAccessSignature, SharedKeyTokenGenerator,
    TokenEnvelope, TokenGenerator, TokenRefreshCredential,
};
