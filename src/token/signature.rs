use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use sha2::Sha256;

use crate::errors::Error;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "SharedAccessSignature";

/// Parsed form of a shared access signature token.
///
/// Wire form: `SharedAccessSignature sr=<resource>&sig=<signature>&se=<expiry>[&skn=<key name>]`,
/// where `sr` and `sig` are url-encoded and `se` is in unix seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedAccessSignature {
    resource: String,
    signature: String,
    expires_on: Timestamp,
    key_name: Option<String>,
}

impl SharedAccessSignature {
    pub fn new(
        resource: impl Into<String>,
        signature: impl Into<String>,
        expires_on: Timestamp,
        key_name: Option<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            signature: signature.into(),
            expires_on,
            key_name,
        }
    }

    /// Signs `resource` with a base64-encoded shared access key.
    pub fn sign(
        resource: &str,
        key: &str,
        expires_on: Timestamp,
        key_name: Option<String>,
    ) -> Result<Self, Error> {
        let key_bytes = general_purpose::STANDARD
            .decode(key)
            .map_err(|e| Error::Key(format!("Failed to decode key: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&key_bytes)
            .map_err(|e| Error::Key(format!("Failed to create HMAC: {e}")))?;
        mac.update(string_to_sign(resource, expires_on).as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        Ok(Self::new(resource, signature, expires_on, key_name))
    }

    pub fn parse(raw: &str) -> Result<Self, Error> {
        let rest = raw
            .trim()
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::TokenParse(format!("missing '{PREFIX}' prefix")))?;
        let rest = rest.trim_start();
        if rest.is_empty() {
            return Err(Error::TokenParse("token carries no fields".into()));
        }

        let mut resource = None;
        let mut signature = None;
        let mut expiry = None;
        let mut key_name = None;
        for field in rest.split('&') {
            let (name, value) = field
                .split_once('=')
                .ok_or_else(|| Error::TokenParse(format!("field '{field}' is not name=value")))?;
            let value = urlencoding::decode(value)
                .map_err(|e| Error::TokenParse(format!("field '{name}' is not url-encoded: {e}")))?
                .into_owned();
            match name {
                "sr" => resource = Some(value),
                "sig" => signature = Some(value),
                "se" => expiry = Some(value),
                "skn" => key_name = Some(value),
                _ => {}
            }
        }

        let resource = resource.ok_or_else(|| Error::TokenParse("missing 'sr' field".into()))?;
        let signature = signature.ok_or_else(|| Error::TokenParse("missing 'sig' field".into()))?;
        let expiry = expiry.ok_or_else(|| Error::TokenParse("missing 'se' field".into()))?;
        let seconds: i64 = expiry
            .parse()
            .map_err(|_| Error::TokenParse(format!("expiry '{expiry}' is not an integer")))?;
        let expires_on = Timestamp::from_second(seconds)
            .map_err(|e| Error::TokenParse(format!("expiry '{expiry}' out of range: {e}")))?;

        Ok(Self {
            resource,
            signature,
            expires_on,
            key_name,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn expires_on(&self) -> Timestamp {
        self.expires_on
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    pub fn to_token_string(&self) -> String {
        let mut token = format!(
            "{PREFIX} sr={}&sig={}&se={}",
            urlencoding::encode(&self.resource),
            urlencoding::encode(&self.signature),
            self.expires_on.as_second()
        );
        if let Some(key_name) = &self.key_name {
            token.push_str("&skn=");
            token.push_str(&urlencoding::encode(key_name));
        }
        token
    }
}

impl fmt::Display for SharedAccessSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token_string())
    }
}

/// Payload an issuer signs: url-encoded resource and expiry seconds.
pub fn string_to_sign(resource: &str, expires_on: Timestamp) -> String {
    format!(
        "{}\n{}",
        urlencoding::encode(resource),
        expires_on.as_second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWRldmljZS1rZXk=";

    #[test]
    fn parse_reads_all_fields() {
        let sas = SharedAccessSignature::parse(
            "SharedAccessSignature sr=hub.example.net%2Fdevices%2Fdev1&sig=abc%2B%3D&se=1700000000&skn=device",
        )
        .expect("valid token");
        assert_eq!(sas.resource(), "hub.example.net/devices/dev1");
        assert_eq!(sas.signature(), "abc+=");
        assert_eq!(sas.expires_on().as_second(), 1_700_000_000);
        assert_eq!(sas.key_name(), Some("device"));
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        let err = SharedAccessSignature::parse("sr=a&sig=b&se=1").expect_err("no prefix");
        assert!(matches!(err, Error::TokenParse(_)));
    }

    #[test]
    fn parse_rejects_missing_expiry() {
        let err = SharedAccessSignature::parse("SharedAccessSignature sr=a&sig=b")
            .expect_err("no se");
        assert!(matches!(err, Error::TokenParse(msg) if msg.contains("'se'")));
    }

    #[test]
    fn parse_rejects_non_numeric_expiry() {
        let err = SharedAccessSignature::parse("SharedAccessSignature sr=a&sig=b&se=soon")
            .expect_err("bad se");
        assert!(matches!(err, Error::TokenParse(_)));
    }

    #[test]
    fn sign_produces_verifiable_signature() {
        let expires_on = Timestamp::from_second(1_700_000_000).unwrap();
        let sas = SharedAccessSignature::sign("hub.example.net/devices/dev1", KEY, expires_on, None)
            .unwrap();

        let mut mac =
            HmacSha256::new_from_slice(&general_purpose::STANDARD.decode(KEY).unwrap()).unwrap();
        mac.update(b"hub.example.net%2Fdevices%2Fdev1\n1700000000");
        let expected = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(sas.signature(), expected);

        let reparsed = SharedAccessSignature::parse(&sas.to_token_string()).unwrap();
        assert_eq!(reparsed, sas);
    }

    #[test]
    fn sign_rejects_invalid_key() {
        let err = SharedAccessSignature::sign("r", "not base64!", Timestamp::now(), None)
            .expect_err("bad key");
        assert!(matches!(err, Error::Key(_)));
    }
}
