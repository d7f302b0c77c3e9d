#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hub_device_auth::{Error, TokenGenerator};
use jiff::{SignedDuration, Timestamp};

pub fn token_expiring_in(audience: &str, tag: &str, lifetime: SignedDuration) -> String {
    let expires_on = Timestamp::now().checked_add(lifetime).expect("expiry in range");
    format!(
        "SharedAccessSignature sr={audience}&sig={tag}&se={}",
        expires_on.as_second()
    )
}

/// Issues tokens with a fixed lifetime, optionally after a delay, and counts calls.
pub struct FixedLifetimeGenerator {
    calls: AtomicUsize,
    lifetime: SignedDuration,
    delay: Duration,
}

impl FixedLifetimeGenerator {
    pub fn new(lifetime_secs: i64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            lifetime: SignedDuration::from_secs(lifetime_secs),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenGenerator for FixedLifetimeGenerator {
    async fn create_token(&self, audience: &str, _suggested_ttl: Duration) -> Result<String, Error> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(token_expiring_in(audience, &format!("gen{n}"), self.lifetime))
    }
}

/// Replays scripted results in order, then keeps returning the last one.
pub struct ScriptedGenerator {
    calls: AtomicUsize,
    script: Mutex<Vec<Result<String, Error>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, Error>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenGenerator for ScriptedGenerator {
    async fn create_token(&self, _audience: &str, _suggested_ttl: Duration) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("script poisoned");
        if script.len() > 1 {
            script.remove(0)
        } else {
            match script.first() {
                Some(Ok(token)) => Ok(token.clone()),
                Some(Err(err)) => Err(Error::Config(format!("scripted failure: {err}"))),
                None => Err(Error::Config("script exhausted".into())),
            }
        }
    }
}
