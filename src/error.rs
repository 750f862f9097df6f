use std::fmt;

/// Why a request never produced a usable envelope.
#[derive(Debug)]
pub enum ConnectError {
    Transport(reqwest::Error),
    Status(u16),
    Body(serde_json::Error),
    Empty,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Transport(e) => write!(f, "transport: {e}"),
            ConnectError::Status(code) => write!(f, "unexpected HTTP status {code}"),
            ConnectError::Body(e) => write!(f, "unreadable response body: {e}"),
            ConnectError::Empty => write!(f, "empty response"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// Transport failure, non-2xx/3xx status, or an empty/unparseable body.
    CannotConnect(ConnectError),
    /// Bad credentials at login (server code 111, or no token issued).
    InvalidAuth,
    /// Session token rejected (server code 104). Not retryable.
    ApiAuth,
    /// Any other application-level failure, with the server's message.
    Api(String),
    Timeout,
    UnknownEndpoint(String),
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    InvalidPreset(String),
    MissingField(&'static str),
    /// The coordinator task is gone; queued actions cannot be answered.
    Stopped,
    Io(std::io::Error),
}

impl Error {
    /// True for failures that end the polling session until re-login.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::ApiAuth)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CannotConnect(e) => write!(f, "cannot connect: {e}"),
            Error::InvalidAuth => write!(f, "invalid credentials"),
            Error::ApiAuth => write!(f, "session expired or invalid, re-authentication required"),
            Error::Api(msg) => write!(f, "API error: {msg}"),
            Error::Timeout => write!(f, "refresh deadline exceeded"),
            Error::UnknownEndpoint(id) => write!(f, "unknown endpoint: {id}"),
            Error::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} out of range: {value} not in {min}..={max}"),
            Error::InvalidPreset(p) => write!(f, "invalid preset: {p}"),
            Error::MissingField(name) => write!(f, "endpoint is missing {name}"),
            Error::Stopped => write!(f, "coordinator stopped"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CannotConnect(ConnectError::Transport(e)) => Some(e),
            Error::CannotConnect(ConnectError::Body(e)) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::CannotConnect(ConnectError::Transport(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
