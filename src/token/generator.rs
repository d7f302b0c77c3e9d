use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use jiff::{SignedDuration, Timestamp};
use tracing::debug;

use crate::errors::Error;

use super::SharedAccessSignature;

/// Mints a new token for `audience`, ideally valid for `suggested_ttl`.
///
/// Implementations may return a token with a different lifetime than the one
/// suggested; the credential reads the real expiry from the returned token.
pub trait TokenGenerator: Send + Sync {
    fn create_token(
        &self,
        audience: &str,
        suggested_ttl: Duration,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

impl<G: TokenGenerator> TokenGenerator for Arc<G> {
    fn create_token(
        &self,
        audience: &str,
        suggested_ttl: Duration,
    ) -> impl Future<Output = Result<String, Error>> + Send {
        (**self).create_token(audience, suggested_ttl)
    }
}

/// Resource URI identifying a device, or a module on a device, on a hub.
pub fn device_resource(host_name: &str, device_id: &str, module_id: Option<&str>) -> String {
    match module_id {
        Some(module_id) => format!("{host_name}/devices/{device_id}/modules/{module_id}"),
        None => format!("{host_name}/devices/{device_id}"),
    }
}

/// Signs tokens locally with a device (or module) shared access key.
#[derive(Clone)]
pub struct SharedKeyTokenGenerator {
    device_id: String,
    module_id: Option<String>,
    shared_access_key: String,
    key_name: Option<String>,
}

impl SharedKeyTokenGenerator {
    pub fn new(device_id: impl Into<String>, shared_access_key: impl Into<String>) -> Result<Self, Error> {
        let device_id = device_id.into();
        let shared_access_key = shared_access_key.into();
        if device_id.is_empty() {
            return Err(Error::InvalidArgument("device id must not be empty".into()));
        }
        // Fail at construction rather than on the first refresh.
        general_purpose::STANDARD
            .decode(&shared_access_key)
            .map_err(|e| Error::Key(format!("Failed to decode key: {e}")))?;
        Ok(Self {
            device_id,
            module_id: None,
            shared_access_key,
            key_name: None,
        })
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Sets the shared access policy name, for keys that belong to a hub policy.
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    fn sign(&self, audience: &str, suggested_ttl: Duration) -> Result<String, Error> {
        let expires_on = Timestamp::now().checked_add(SignedDuration::try_from(suggested_ttl)?)?;
        let resource = device_resource(audience, &self.device_id, self.module_id.as_deref());
        let sas = SharedAccessSignature::sign(
            &resource,
            &self.shared_access_key,
            expires_on,
            self.key_name.clone(),
        )?;
        debug!(resource = %resource, expires_on = %expires_on, "signed shared access token");
        Ok(sas.to_token_string())
    }
}

impl std::fmt::Debug for SharedKeyTokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyTokenGenerator")
            .field("device_id", &self.device_id)
            .field("module_id", &self.module_id)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl TokenGenerator for SharedKeyTokenGenerator {
    fn create_token(
        &self,
        audience: &str,
        suggested_ttl: Duration,
    ) -> impl Future<Output = Result<String, Error>> + Send {
        let result = self.sign(audience, suggested_ttl);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWRldmljZS1rZXk=";

    #[tokio::test(flavor = "current_thread")]
    async fn shared_key_token_targets_device_resource() {
        let generator = SharedKeyTokenGenerator::new("dev-1", KEY).unwrap();
        let before = Timestamp::now().as_second();
        let raw = generator
            .create_token("hub.example.net", Duration::from_secs(600))
            .await
            .unwrap();
        let sas = SharedAccessSignature::parse(&raw).unwrap();
        assert_eq!(sas.resource(), "hub.example.net/devices/dev-1");
        assert!(sas.key_name().is_none());
        let expiry = sas.expires_on().as_second();
        assert!(expiry >= before + 600 && expiry <= before + 602);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn shared_key_token_targets_module_with_policy() {
        let generator = SharedKeyTokenGenerator::new("dev-1", KEY)
            .unwrap()
            .with_module("telemetry")
            .with_key_name("registryRead");
        let raw = generator
            .create_token("hub.example.net", Duration::from_secs(60))
            .await
            .unwrap();
        let sas = SharedAccessSignature::parse(&raw).unwrap();
        assert_eq!(sas.resource(), "hub.example.net/devices/dev-1/modules/telemetry");
        assert_eq!(sas.key_name(), Some("registryRead"));
    }

    #[test]
    fn rejects_undecodable_key() {
        let err = SharedKeyTokenGenerator::new("dev-1", "%%%").expect_err("bad key");
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn debug_output_hides_key() {
        let generator = SharedKeyTokenGenerator::new("dev-1", KEY).unwrap();
        assert!(!format!("{generator:?}").contains(KEY));
    }
}
