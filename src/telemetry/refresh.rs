use jiff::Timestamp;
use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

/// Structured events for a single token-generation attempt.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn emit_start(&self, audience: &str, at: Timestamp) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            audience,
            timestamp = %at,
            "refresh.start"
        );
    }

    pub fn emit_success(&self, expires_on: Timestamp, refreshes_on: Timestamp, at: Timestamp) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = %at,
            expires_on = %expires_on,
            refreshes_on = %refreshes_on,
            "refresh.success"
        );
    }

    /// Another caller refreshed the token while this one waited on the gate.
    pub fn emit_coalesced(&self, expires_on: Timestamp) {
        event!(
            Level::DEBUG,
            attempt_id = %self.attempt_id,
            context = %self.context,
            expires_on = %expires_on,
            "refresh.coalesced"
        );
    }

    pub fn emit_failure(&self, error: &Error, at: Timestamp) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = %at,
            error = %error,
            "refresh.failure"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_preserves_context_and_id() {
        let telemetry = RefreshTelemetry::new("ctx");
        assert_eq!(telemetry.context(), "ctx");
        let first = telemetry.attempt_id();
        assert_eq!(first, telemetry.attempt_id());
        assert_ne!(first, RefreshTelemetry::new("ctx").attempt_id());
    }
}
