use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::ConnectError;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::*;
use crate::types::*;
use crate::{Error, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CosaClientBuilder {
    host: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl Default for CosaClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CosaClientBuilder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    /// Base URL including scheme, e.g. `http://127.0.0.1:8080` in tests.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// A token persisted from an earlier login.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CosaClient> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, path)?)),
            _ => None,
        };

        Ok(CosaClient {
            http,
            host: self.host,
            auth_token: self.auth_token,
            logger,
        })
    }
}

/// Typed, token-authenticated transport to the Cosa cloud.
pub struct CosaClient {
    http: reqwest::Client,
    host: String,
    auth_token: Option<String>,
    logger: Option<Mutex<MessageLogger>>,
}

impl CosaClient {
    pub fn builder() -> CosaClientBuilder {
        CosaClientBuilder::new()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.auth_token = Some(token.into());
    }

    /// Log in and keep the issued token for subsequent calls.
    pub async fn authenticate(&mut self, email: &str, password: &str) -> Result<String> {
        let resp = self.request(&Login { email, password }).await?;
        match resp.auth_token {
            Some(token) if !token.is_empty() => {
                debug!("authenticated");
                self.auth_token = Some(token.clone());
                Ok(token)
            }
            _ => Err(Error::InvalidAuth),
        }
    }

    pub async fn get_user(&self) -> Result<Value> {
        Ok(self.request(&GetUser {}).await?.user)
    }

    pub async fn list_endpoints(&self) -> Result<Vec<EndpointRef>> {
        Ok(self.request(&GetEndpoints {}).await?.endpoints)
    }

    pub async fn get_endpoint(&self, endpoint_id: &str) -> Result<Endpoint> {
        let req = GetEndpoint {
            endpoint: endpoint_id,
        };
        Ok(self.request(&req).await?.endpoint)
    }

    pub async fn get_endpoint_clients(&self, endpoint_id: &str) -> Result<Vec<Value>> {
        let req = GetEndpointClients {
            endpoint: endpoint_id,
        };
        Ok(self.request(&req).await?.endpoint_clients)
    }

    pub async fn get_place(&self, place_id: &str) -> Result<Value> {
        Ok(self.request(&GetPlace { place: place_id }).await?.place)
    }

    pub async fn get_target_temperatures(&self, endpoint_id: &str) -> Result<TargetTemperatures> {
        let req = GetTargetTemperatures {
            endpoint: endpoint_id,
        };
        Ok(self.request(&req).await?.target_temperatures)
    }

    // -- Write methods --
    //
    // The server has no partial updates: every write carries the full
    // object, with unspecified fields taken from the endpoint passed in.

    pub async fn set_target_temperatures(
        &self,
        endpoint: &Endpoint,
        overrides: TargetTemperatureOverrides,
    ) -> Result<bool> {
        let req = SetTargetTemperatures {
            endpoint: &endpoint.id,
            target_temperatures: overrides.resolve(endpoint),
        };
        Ok(self.request(&req).await?.succeeded())
    }

    pub async fn set_option(&self, endpoint_id: &str, option: Preset) -> Result<bool> {
        let req = SetOption {
            endpoint: endpoint_id,
            option,
        };
        Ok(self.request(&req).await?.succeeded())
    }

    pub async fn set_mode(&self, endpoint_id: &str, mode: Mode, option: Preset) -> Result<bool> {
        let req = SetMode {
            endpoint: endpoint_id,
            mode,
            option,
        };
        Ok(self.request(&req).await?.succeeded())
    }

    pub async fn set_combi_settings(
        &self,
        endpoint: &Endpoint,
        overrides: PidWindowOverrides,
    ) -> Result<bool> {
        let req = SetCombiSettings {
            endpoint: &endpoint.id,
            combi_settings: overrides.resolve(endpoint)?,
        };
        Ok(self.request(&req).await?.succeeded())
    }

    pub async fn set_device_settings(&self, endpoint_id: &str, calibration: f64) -> Result<bool> {
        let req = SetDeviceSettings {
            endpoint: endpoint_id,
            calibration,
        };
        Ok(self.request(&req).await?.succeeded())
    }

    // -- Transport --

    async fn request<R: Request>(&self, req: &R) -> Result<R::Response> {
        let body = serde_json::to_value(req)
            .map_err(|e| Error::CannotConnect(ConnectError::Body(e)))?;
        let url = format!("{}/{}", self.host, R::PATH);

        let mut builder = self
            .http
            .post(&url)
            .header(ACCEPT, HEADER_ACCEPT)
            .header(CONTENT_TYPE, HEADER_CONTENT_TYPE);
        if R::AUTH {
            let Some(token) = self.auth_token.as_deref() else {
                warn!(path = R::PATH, "no auth token stored, login required");
                return Err(Error::ApiAuth);
            };
            builder = builder.header(HEADER_AUTH_TOKEN, token);
        }

        debug!(path = R::PATH, "cosa request");
        self.log(|l| l.log_request(R::PATH, R::AUTH, &body));

        let resp = builder.body(body.to_string()).send().await?;
        let status = resp.status();
        if !(status.is_success() || status.is_redirection()) {
            debug!(path = R::PATH, status = status.as_u16(), "rejected by server");
            return Err(Error::CannotConnect(ConnectError::Status(status.as_u16())));
        }

        let text = resp.text().await?;
        trace!(path = R::PATH, body = %text, "cosa response");
        self.log(|l| {
            let parsed = serde_json::from_str(&text).unwrap_or(Value::Null);
            l.log_response(R::PATH, status.as_u16(), &parsed)
        });

        let envelope = decode_envelope(&text)?;
        decode_response(envelope)
    }

    fn log(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut guard) = logger.lock()
        {
            f(&mut guard);
        }
    }
}
