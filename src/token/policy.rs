use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

use crate::errors::Error;

/// Business rules governing proactive refresh behaviour.
///
/// Built through [`RefreshPolicy::new`] or `Default` outside this crate, so
/// callers always hold in-range values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Lifetime requested from the generator for every new token.
    pub(super) suggested_ttl: SignedDuration,
    /// Share of a token's lifetime, in percent, treated as the refresh buffer.
    pub(super) buffer_percentage: u8,
}

impl RefreshPolicy {
    pub const DEFAULT_TTL_SECS: i64 = 3600;
    pub const DEFAULT_BUFFER_PERCENTAGE: u8 = 15;

    pub fn new(suggested_ttl_secs: i64, buffer_percentage: u8) -> Result<Self, Error> {
        let policy = Self {
            suggested_ttl: SignedDuration::from_secs(suggested_ttl_secs),
            buffer_percentage,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks the ranges a credential relies on.
    ///
    /// The TTL must be non-negative and `now ± ttl` must stay a representable
    /// timestamp, since the credential starts at `now - ttl` and generators sign
    /// until `now + ttl`.
    pub fn validate(&self) -> Result<(), Error> {
        let secs = self.suggested_ttl.as_secs();
        if secs < 0 {
            return Err(Error::InvalidArgument(format!(
                "suggested time to live must be >= 0 seconds (got {secs})"
            )));
        }
        let now = Timestamp::now();
        if now.checked_sub(self.suggested_ttl).is_err() || now.checked_add(self.suggested_ttl).is_err()
        {
            return Err(Error::InvalidArgument(format!(
                "suggested time to live of {secs} seconds is out of the supported timestamp range"
            )));
        }
        if self.buffer_percentage > 100 {
            return Err(Error::InvalidArgument(format!(
                "time buffer percentage must be within 0..=100 (got {})",
                self.buffer_percentage
            )));
        }
        Ok(())
    }

    pub fn suggested_ttl(&self) -> Duration {
        Duration::from_secs(self.suggested_ttl.as_secs().unsigned_abs())
    }

    pub fn suggested_ttl_signed(&self) -> SignedDuration {
        self.suggested_ttl
    }

    pub fn buffer_percentage(&self) -> u8 {
        self.buffer_percentage
    }

    /// Portion of `ttl` reserved as the refresh buffer.
    pub fn buffer_for(&self, ttl: SignedDuration) -> Result<SignedDuration, Error> {
        let secs = ttl.as_secs_f64() * f64::from(self.buffer_percentage) / 100.0;
        Ok(SignedDuration::try_from_secs_f64(secs)?)
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            suggested_ttl: SignedDuration::from_secs(Self::DEFAULT_TTL_SECS),
            buffer_percentage: Self::DEFAULT_BUFFER_PERCENTAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_ttl() {
        let err = RefreshPolicy::new(-1, 10).expect_err("negative ttl");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_buffer_above_hundred() {
        let err = RefreshPolicy::new(3600, 101).expect_err("buffer too large");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_ttl_beyond_timestamp_range() {
        let err = RefreshPolicy::new(i64::MAX, 10).expect_err("ttl overflows timestamps");
        assert!(matches!(err, Error::InvalidArgument(_)));

        // Far larger than the span between now and the earliest timestamp jiff supports.
        let err = RefreshPolicy::new(500_000_000_000, 10).expect_err("ttl past range");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn accepts_boundaries() {
        assert!(RefreshPolicy::new(0, 0).is_ok());
        assert!(RefreshPolicy::new(0, 100).is_ok());
        assert!(RefreshPolicy::new(100 * 365 * 24 * 3600, 15).is_ok());
    }

    #[test]
    fn hand_built_out_of_range_policy_fails_validation() {
        let policy = RefreshPolicy {
            suggested_ttl: SignedDuration::from_secs(3600),
            buffer_percentage: 250,
        };
        assert!(matches!(policy.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn default_is_valid() {
        let policy = RefreshPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.suggested_ttl(), Duration::from_secs(3600));
        assert_eq!(policy.buffer_percentage(), 15);
    }

    #[test]
    fn buffer_is_percentage_of_ttl() {
        let policy = RefreshPolicy::new(3600, 10).unwrap();
        let buffer = policy.buffer_for(SignedDuration::from_secs(1800)).unwrap();
        assert_eq!(buffer, SignedDuration::from_secs(180));
    }
}
