use std::sync::Arc;

use crate::errors::Error;
use crate::token::{TokenGenerator, TokenRefreshCredential};

/// Binds a shared credential to the hub it authenticates against.
pub struct DeviceAuthContext<G> {
    host_name: String,
    credential: Arc<TokenRefreshCredential<G>>,
}

impl<G> Clone for DeviceAuthContext<G> {
    fn clone(&self) -> Self {
        Self {
            host_name: self.host_name.clone(),
            credential: Arc::clone(&self.credential),
        }
    }
}

impl<G: TokenGenerator> DeviceAuthContext<G> {
    pub fn build(host_name: impl Into<String>, credential: TokenRefreshCredential<G>) -> Self {
        Self {
            host_name: host_name.into(),
            credential: Arc::new(credential),
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn credential(&self) -> Arc<TokenRefreshCredential<G>> {
        Arc::clone(&self.credential)
    }

    /// Current token for this hub, refreshed if it is inside its buffer.
    pub async fn authorization(&self) -> Result<String, Error> {
        self.credential.token(&self.host_name).await
    }

    pub fn close(&self) {
        self.credential.dispose();
    }
}
