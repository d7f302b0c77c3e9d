//! read device identity configuration from a file, the environment or a connection string

use crate::auth_context::DeviceAuthContext;
use crate::errors::Error;
use crate::token::{RefreshPolicy, SharedKeyTokenGenerator, TokenRefreshCredential};

pub enum ConfigLocation {
    File(String),
    Env,
    ConnectionString(String),
}

#[derive(Clone, serde::Deserialize)]
pub struct DeviceConfig {
    pub host_name: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub shared_access_key: String,
    pub shared_access_key_name: Option<String>,
    pub token_ttl_secs: Option<i64>,
    pub buffer_percentage: Option<u8>,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("module_id", &self.module_id)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("buffer_percentage", &self.buffer_percentage)
            .finish_non_exhaustive()
    }
}

impl DeviceConfig {
    /// Parses `HostName=..;DeviceId=..;[ModuleId=..;]SharedAccessKey=..[;SharedAccessKeyName=..]`.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, Error> {
        let mut host_name = None;
        let mut device_id = None;
        let mut module_id = None;
        let mut shared_access_key = None;
        let mut shared_access_key_name = None;
        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            // Keys are base64 and may end in '=', so split on the first one only.
            let (name, value) = part.split_once('=').ok_or_else(|| {
                Error::Config(format!("Connection string segment '{part}' is not Name=Value"))
            })?;
            let value = value.trim().to_string();
            match name.trim() {
                "HostName" => host_name = Some(value),
                "DeviceId" => device_id = Some(value),
                "ModuleId" => module_id = Some(value),
                "SharedAccessKey" => shared_access_key = Some(value),
                "SharedAccessKeyName" => shared_access_key_name = Some(value),
                _ => {}
            }
        }
        let config = DeviceConfig {
            host_name: host_name
                .ok_or_else(|| Error::Config("Connection string is missing HostName".into()))?,
            device_id: device_id
                .ok_or_else(|| Error::Config("Connection string is missing DeviceId".into()))?,
            module_id,
            shared_access_key: shared_access_key.ok_or_else(|| {
                Error::Config("Connection string is missing SharedAccessKey".into())
            })?,
            shared_access_key_name,
            token_ttl_secs: None,
            buffer_percentage: None,
        };
        Ok(config)
    }

    pub fn refresh_policy(&self) -> Result<RefreshPolicy, Error> {
        RefreshPolicy::new(
            self.token_ttl_secs.unwrap_or(RefreshPolicy::DEFAULT_TTL_SECS),
            self.buffer_percentage
                .unwrap_or(RefreshPolicy::DEFAULT_BUFFER_PERCENTAGE),
        )
    }

    pub fn token_generator(&self) -> Result<SharedKeyTokenGenerator, Error> {
        let mut generator =
            SharedKeyTokenGenerator::new(self.device_id.as_str(), self.shared_access_key.as_str())?;
        if let Some(module_id) = &self.module_id {
            generator = generator.with_module(module_id.as_str());
        }
        if let Some(key_name) = &self.shared_access_key_name {
            generator = generator.with_key_name(key_name.as_str());
        }
        Ok(generator)
    }

    /// Builds a shared-key credential bound to this device's hub.
    pub fn into_auth_context(self) -> Result<DeviceAuthContext<SharedKeyTokenGenerator>, Error> {
        let context = match &self.module_id {
            Some(module_id) => format!("{}/{}", self.device_id, module_id),
            None => self.device_id.clone(),
        };
        let credential = TokenRefreshCredential::new(self.token_generator()?, self.refresh_policy()?)?
            .with_context(context);
        Ok(DeviceAuthContext::build(self.host_name, credential))
    }
}

pub fn read_config(loc: ConfigLocation) -> Result<DeviceConfig, Error> {
    let config = match loc {
        ConfigLocation::File(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        }
        ConfigLocation::Env => read_config_from_env()?,
        ConfigLocation::ConnectionString(value) => DeviceConfig::from_connection_string(&value)?,
    };
    validate(&config)?;
    Ok(config)
}

fn read_config_from_env() -> Result<DeviceConfig, Error> {
    Ok(DeviceConfig {
        host_name: std::env::var("IOTHUB_HOSTNAME")
            .map_err(|_| Error::Config("Missing IOTHUB_HOSTNAME env var".to_string()))?,
        device_id: std::env::var("IOTHUB_DEVICE_ID")
            .map_err(|_| Error::Config("Missing IOTHUB_DEVICE_ID env var".to_string()))?,
        module_id: std::env::var("IOTHUB_MODULE_ID").ok(),
        shared_access_key: std::env::var("IOTHUB_DEVICE_KEY")
            .map_err(|_| Error::Config("Missing IOTHUB_DEVICE_KEY env var".to_string()))?,
        shared_access_key_name: None,
        token_ttl_secs: optional_env("IOTHUB_TOKEN_TTL_SECS")?,
        buffer_percentage: optional_env("IOTHUB_BUFFER_PERCENTAGE")?,
    })
}

fn optional_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid {name} env var: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn validate(config: &DeviceConfig) -> Result<(), Error> {
    if config.host_name.trim().is_empty() {
        return Err(Error::Config("host_name must not be empty".into()));
    }
    if config.device_id.trim().is_empty() {
        return Err(Error::Config("device_id must not be empty".into()));
    }
    if config.shared_access_key.trim().is_empty() {
        return Err(Error::Config("shared_access_key must not be empty".into()));
    }
    Ok(())
}
