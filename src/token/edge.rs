//! Token generation delegated to the edge security daemon's workload API.

use std::future::Future;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use jiff::{SignedDuration, Timestamp};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::Error;

use super::generator::device_resource;
use super::signature::string_to_sign;
use super::{SharedAccessSignature, TokenGenerator};

pub const DEFAULT_WORKLOAD_API_VERSION: &str = "2019-01-30";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    key_id: &'a str,
    algo: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct SignResponse {
    digest: String,
}

/// Asks the workload API to sign module tokens, so the module never sees its key.
#[derive(Clone, Debug)]
pub struct EdgeWorkloadTokenGenerator {
    http_client: Client,
    workload_uri: String,
    api_version: String,
    device_id: String,
    module_id: String,
    generation_id: String,
}

impl EdgeWorkloadTokenGenerator {
    pub fn new(
        workload_uri: &str,
        device_id: impl Into<String>,
        module_id: impl Into<String>,
        generation_id: impl Into<String>,
    ) -> Result<Self, Error> {
        if workload_uri.starts_with("unix://") {
            return Err(Error::Config(format!(
                "workload uri '{workload_uri}' uses a unix socket; only http(s) endpoints are supported"
            )));
        }
        reqwest::Url::parse(workload_uri).map_err(|e| {
            Error::Config(format!("Invalid workload uri '{workload_uri}': {e}"))
        })?;
        Ok(Self {
            http_client: Client::new(),
            workload_uri: workload_uri.trim_end_matches('/').to_string(),
            api_version: DEFAULT_WORKLOAD_API_VERSION.to_string(),
            device_id: device_id.into(),
            module_id: module_id.into(),
            generation_id: generation_id.into(),
        })
    }

    /// Reads the variables the edge runtime injects into every module.
    pub fn from_env() -> Result<Self, Error> {
        let mut generator = Self::new(
            &required_env("IOTEDGE_WORKLOADURI")?,
            required_env("IOTEDGE_DEVICEID")?,
            required_env("IOTEDGE_MODULEID")?,
            required_env("IOTEDGE_MODULEGENERATIONID")?,
        )?;
        if let Ok(api_version) = std::env::var("IOTEDGE_APIVERSION") {
            generator.api_version = api_version;
        }
        Ok(generator)
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    async fn sign(&self, audience: &str, suggested_ttl: Duration) -> Result<String, Error> {
        let expires_on = Timestamp::now().checked_add(SignedDuration::try_from(suggested_ttl)?)?;
        let resource = device_resource(audience, &self.device_id, Some(&self.module_id));
        let url = format!(
            "{}/modules/{}/genid/{}/sign?api-version={}",
            self.workload_uri,
            urlencoding::encode(&self.module_id),
            urlencoding::encode(&self.generation_id),
            urlencoding::encode(&self.api_version)
        );
        let request = SignRequest {
            key_id: "primary",
            algo: "HMACSHA256",
            data: general_purpose::STANDARD.encode(string_to_sign(&resource, expires_on)),
        };

        let resp = self.http_client.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(
                "workload sign failed: status={} module='{}' body='{}'",
                status, self.module_id, body
            );
            return Err(Error::TokenService(status, body));
        }
        let SignResponse { digest } = resp.json().await?;
        info!("workload sign ok: module='{}'", self.module_id);

        Ok(SharedAccessSignature::new(resource, digest, expires_on, None).to_token_string())
    }
}

impl TokenGenerator for EdgeWorkloadTokenGenerator {
    fn create_token(
        &self,
        audience: &str,
        suggested_ttl: Duration,
    ) -> impl Future<Output = Result<String, Error>> + Send {
        self.sign(audience, suggested_ttl)
    }
}

fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Config(format!("Missing {name} env var")))
}
