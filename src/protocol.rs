use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectError;
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "https://kiwi.cosa.com.tr";

pub const HEADER_ACCEPT: &str = "application/json, text/plain, */*";
pub const HEADER_CONTENT_TYPE: &str = "application/json;charset=utf-8";
pub const HEADER_AUTH_TOKEN: &str = "authToken";

pub const CODE_INVALID_CREDENTIALS: i64 = 111;
pub const CODE_SESSION_ERROR: i64 = 104;

/// One vendor operation: where it goes, whether it needs the token,
/// and what the success envelope decodes into.
pub(crate) trait Request: Serialize {
    const PATH: &'static str;
    const AUTH: bool = true;
    type Response: DeserializeOwned;
}

#[derive(Serialize)]
pub(crate) struct Login<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Request for Login<'_> {
    const PATH: &'static str = "api/users/login";
    const AUTH: bool = false;
    type Response = LoginResponse;
}

#[derive(Serialize)]
pub(crate) struct GetUser {}

#[derive(Deserialize)]
pub(crate) struct UserResponse {
    pub user: Value,
}

impl Request for GetUser {
    const PATH: &'static str = "api/users/getInfo";
    type Response = UserResponse;
}

#[derive(Serialize)]
pub(crate) struct GetEndpoints {}

#[derive(Deserialize)]
pub(crate) struct EndpointsResponse {
    pub endpoints: Vec<EndpointRef>,
}

impl Request for GetEndpoints {
    const PATH: &'static str = "api/endpoints/getEndpoints";
    type Response = EndpointsResponse;
}

#[derive(Serialize)]
pub(crate) struct GetEndpoint<'a> {
    pub endpoint: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct EndpointResponse {
    pub endpoint: Endpoint,
}

impl Request for GetEndpoint<'_> {
    const PATH: &'static str = "api/endpoints/getEndpoint";
    type Response = EndpointResponse;
}

#[derive(Serialize)]
pub(crate) struct GetEndpointClients<'a> {
    pub endpoint: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EndpointClientsResponse {
    pub endpoint_clients: Vec<Value>,
}

impl Request for GetEndpointClients<'_> {
    const PATH: &'static str = "api/endpointClients/getEndpointClients";
    type Response = EndpointClientsResponse;
}

#[derive(Serialize)]
pub(crate) struct GetPlace<'a> {
    pub place: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct PlaceResponse {
    pub place: Value,
}

impl Request for GetPlace<'_> {
    const PATH: &'static str = "api/places/getPlace";
    type Response = PlaceResponse;
}

#[derive(Serialize)]
pub(crate) struct GetTargetTemperatures<'a> {
    pub endpoint: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetTemperaturesResponse {
    pub target_temperatures: TargetTemperatures,
}

impl Request for GetTargetTemperatures<'_> {
    const PATH: &'static str = "api/endpoints/getTargetTemperatures";
    type Response = TargetTemperaturesResponse;
}

/// Success envelope of every write: only `ok` matters.
#[derive(Deserialize)]
pub(crate) struct WriteResponse {
    pub ok: Value,
}

impl WriteResponse {
    pub fn succeeded(&self) -> bool {
        self.ok.as_i64() == Some(1) || self.ok.as_bool() == Some(true)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetTargetTemperatures<'a> {
    pub endpoint: &'a str,
    pub target_temperatures: TargetTemperatures,
}

impl Request for SetTargetTemperatures<'_> {
    const PATH: &'static str = "api/endpoints/setTargetTemperatures";
    type Response = WriteResponse;
}

#[derive(Serialize)]
pub(crate) struct SetOption<'a> {
    pub endpoint: &'a str,
    pub option: Preset,
}

impl Request for SetOption<'_> {
    const PATH: &'static str = "api/endpoints/setOption";
    type Response = WriteResponse;
}

#[derive(Serialize)]
pub(crate) struct SetMode<'a> {
    pub endpoint: &'a str,
    pub mode: Mode,
    pub option: Preset,
}

impl Request for SetMode<'_> {
    const PATH: &'static str = "api/endpoints/setMode";
    type Response = WriteResponse;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetCombiSettings<'a> {
    pub endpoint: &'a str,
    pub combi_settings: CombiSettings,
}

impl Request for SetCombiSettings<'_> {
    const PATH: &'static str = "api/endpoints/setCombiSettings";
    type Response = WriteResponse;
}

#[derive(Serialize)]
pub(crate) struct SetDeviceSettings<'a> {
    pub endpoint: &'a str,
    pub calibration: f64,
}

impl Request for SetDeviceSettings<'_> {
    const PATH: &'static str = "api/endpoints/setDeviceSettings";
    type Response = WriteResponse;
}

fn is_truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

/// Decode a response body into the success envelope or one error kind.
pub(crate) fn decode_envelope(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Err(Error::CannotConnect(ConnectError::Empty));
    }
    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| Error::CannotConnect(ConnectError::Body(e)))?;
    if !envelope.is_object() {
        return Err(Error::CannotConnect(ConnectError::Empty));
    }

    if is_truthy(envelope.get("ok")) {
        return Ok(envelope);
    }

    match envelope.get("code").and_then(|v| v.as_i64()) {
        Some(CODE_INVALID_CREDENTIALS) => return Err(Error::InvalidAuth),
        Some(CODE_SESSION_ERROR) => return Err(Error::ApiAuth),
        _ => {}
    }

    let message = envelope
        .pointer("/error/0/message")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown API error");
    Err(Error::Api(message.to_string()))
}

pub(crate) fn decode_response<R: DeserializeOwned>(envelope: Value) -> Result<R> {
    serde_json::from_value(envelope).map_err(|e| Error::CannotConnect(ConnectError::Body(e)))
}
