mod credential;
pub mod edge;
mod envelope;
mod generator;
mod policy;
pub mod signature;

pub use credential::{CredentialResult, TokenRefreshCredential};
pub use edge::EdgeWorkloadTokenGenerator;
pub use envelope::TokenEnvelope;
pub use generator::{SharedKeyTokenGenerator, TokenGenerator, device_resource};
pub use policy::RefreshPolicy;
pub use signature::SharedAccessSignature;
