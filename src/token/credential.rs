use std::sync::atomic::{AtomicBool, Ordering};

use jiff::{SignedDuration, Timestamp};
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::errors::Error;
use crate::telemetry::refresh::RefreshTelemetry;

use super::{RefreshPolicy, TokenEnvelope, TokenGenerator};

/// Convenience result alias for credential operations.
pub type CredentialResult<T> = Result<T, Error>;

const DEFAULT_CONTEXT: &str = "token_refresh";

/// Lazily refreshing token cache for one authentication identity.
///
/// Callers share the cached token while it is outside its refresh buffer. Once it
/// is expiring, the first caller through the gate asks the generator for a new
/// token and every caller queued behind it reuses the result.
pub struct TokenRefreshCredential<G> {
    generator: G,
    policy: RefreshPolicy,
    envelope: RwLock<TokenEnvelope>,
    // One permit. Closing it on dispose fails current and future waiters.
    gate: Semaphore,
    disposed: AtomicBool,
    context: String,
}

impl<G: TokenGenerator> TokenRefreshCredential<G> {
    pub fn new(generator: G, policy: RefreshPolicy) -> CredentialResult<Self> {
        policy.validate()?;
        let envelope = TokenEnvelope::expired(&policy, Timestamp::now())?;
        debug!(
            suggested_ttl_secs = policy.suggested_ttl().as_secs(),
            buffer_percentage = policy.buffer_percentage(),
            "token refresh credential created"
        );
        Ok(Self {
            generator,
            policy,
            envelope: RwLock::new(envelope),
            gate: Semaphore::new(1),
            disposed: AtomicBool::new(false),
            context: DEFAULT_CONTEXT.to_string(),
        })
    }

    /// Validates the raw inputs and builds the credential.
    pub fn try_new(
        generator: G,
        suggested_ttl_secs: i64,
        buffer_percentage: u8,
    ) -> CredentialResult<Self> {
        let policy = RefreshPolicy::new(suggested_ttl_secs, buffer_percentage)?;
        Self::new(generator, policy)
    }

    /// Label attached to refresh telemetry events.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Returns a token for `audience`, generating a new one if the cached token is expiring.
    pub async fn token(&self, audience: &str) -> CredentialResult<String> {
        self.ensure_not_disposed()?;
        if let Some(token) = self.fresh_token() {
            debug!(context = %self.context, "cached token reused");
            return Ok(token);
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| disposed_error())?;

        let telemetry = RefreshTelemetry::new(self.context.as_str());
        if let Some(token) = self.fresh_token() {
            telemetry.emit_coalesced(self.expires_on());
            return Ok(token);
        }

        telemetry.emit_start(audience, Timestamp::now());
        match self.generate(audience).await {
            Ok(envelope) => {
                telemetry.emit_success(
                    envelope.expires_on(),
                    envelope.refreshes_on(),
                    Timestamp::now(),
                );
                let token = envelope.value().to_string();
                *self.envelope.write() = envelope;
                Ok(token)
            }
            Err(err) => {
                telemetry.emit_failure(&err, Timestamp::now());
                Err(err)
            }
        }
    }

    async fn generate(&self, audience: &str) -> CredentialResult<TokenEnvelope> {
        let raw = self
            .generator
            .create_token(audience, self.policy.suggested_ttl())
            .await?;
        debug!(len = raw.len(), "token generated");
        TokenEnvelope::from_token(raw, &self.policy, Timestamp::now())
    }

    fn fresh_token(&self) -> Option<String> {
        let envelope = self.envelope.read();
        if envelope.is_expiring(Timestamp::now()) {
            None
        } else {
            Some(envelope.value().to_string())
        }
    }
}

impl<G> TokenRefreshCredential<G> {
    pub fn is_expiring(&self) -> bool {
        self.envelope.read().is_expiring(Timestamp::now())
    }

    pub fn expires_on(&self) -> Timestamp {
        self.envelope.read().expires_on()
    }

    /// Point in time after which the cached token is treated as expiring.
    pub fn refreshes_on(&self) -> Timestamp {
        self.envelope.read().refreshes_on()
    }

    pub fn buffer(&self) -> SignedDuration {
        self.envelope.read().buffer()
    }

    /// Copy of the cached token and its timing metadata.
    pub fn snapshot(&self) -> TokenEnvelope {
        self.envelope.read().clone()
    }

    /// Closes the refresh gate. Pending and later `token` calls fail with `InvalidState`.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.gate.close();
            debug!(context = %self.context, "token refresh credential disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_not_disposed(&self) -> CredentialResult<()> {
        if self.is_disposed() {
            return Err(disposed_error());
        }
        Ok(())
    }
}

impl<G> std::fmt::Debug for TokenRefreshCredential<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let envelope = self.envelope.read();
        f.debug_struct("TokenRefreshCredential")
            .field("context", &self.context)
            .field("policy", &self.policy)
            .field("expires_on", &envelope.expires_on())
            .field("refreshes_on", &envelope.refreshes_on())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

fn disposed_error() -> Error {
    Error::InvalidState("token refresh credential has been disposed".into())
}
