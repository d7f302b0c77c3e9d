use jiff::{SignedDuration, Timestamp};

use crate::errors::Error;

use super::{RefreshPolicy, SharedAccessSignature};

/// Cached token plus the timing metadata required for refresh decisions.
///
/// The fields only ever change together: a refresh builds a whole new envelope
/// and swaps it in.
#[derive(Clone, Debug)]
pub struct TokenEnvelope {
    value: String,
    expires_on: Timestamp,
    buffer: SignedDuration,
    refreshes_on: Timestamp,
}

impl TokenEnvelope {
    /// Empty envelope that is already expiring, so the first request generates a token.
    ///
    /// The buffer here comes from the suggested TTL; later envelopes derive it from
    /// the lifetime the issued token actually carries.
    pub fn expired(policy: &RefreshPolicy, now: Timestamp) -> Result<Self, Error> {
        let ttl = policy.suggested_ttl_signed();
        let expires_on = now.checked_sub(ttl)?;
        Self::assemble(String::new(), expires_on, policy.buffer_for(ttl)?)
    }

    /// Builds the envelope for a freshly generated token.
    pub fn from_token(raw: String, policy: &RefreshPolicy, now: Timestamp) -> Result<Self, Error> {
        let expires_on = SharedAccessSignature::parse(&raw)?.expires_on();
        let buffer = policy.buffer_for(expires_on.duration_since(now))?;
        Self::assemble(raw, expires_on, buffer)
    }

    fn assemble(value: String, expires_on: Timestamp, buffer: SignedDuration) -> Result<Self, Error> {
        let refreshes_on = expires_on.checked_sub(buffer)?;
        Ok(Self {
            value,
            expires_on,
            buffer,
            refreshes_on,
        })
    }

    /// Returns the raw token value suitable for authorization headers.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_on(&self) -> Timestamp {
        self.expires_on
    }

    pub fn buffer(&self) -> SignedDuration {
        self.buffer
    }

    pub fn refreshes_on(&self) -> Timestamp {
        self.refreshes_on
    }

    /// Time left until expiry; negative once the token has expired.
    pub fn remaining(&self, now: Timestamp) -> SignedDuration {
        self.expires_on.duration_since(now)
    }

    pub fn is_expiring(&self, now: Timestamp) -> bool {
        self.remaining(now) <= self.buffer
    }
}
