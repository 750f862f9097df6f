use std::fmt;

use tracing::error;

use crate::client::CosaClient;
use crate::Error;

/// Login outcome as a setup form would present it. Carries no server detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    CannotConnect,
    InvalidAuth,
    Unknown,
}

impl LoginFailure {
    pub fn form_key(&self) -> &'static str {
        match self {
            LoginFailure::CannotConnect => "cannot_connect",
            LoginFailure::InvalidAuth => "invalid_auth",
            LoginFailure::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_key())
    }
}

impl std::error::Error for LoginFailure {}

impl From<Error> for LoginFailure {
    fn from(e: Error) -> Self {
        match e {
            Error::CannotConnect(_) => LoginFailure::CannotConnect,
            Error::InvalidAuth => LoginFailure::InvalidAuth,
            other => {
                error!(error = %other, "unexpected error during login");
                LoginFailure::Unknown
            }
        }
    }
}

/// What the host should persist after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub title: String,
    pub auth_token: String,
}

/// Exchange email and password for a token the host can store and
/// hand back to [`CosaClient::builder`] on the next start.
pub async fn validate_login(
    client: &mut CosaClient,
    email: &str,
    password: &str,
) -> Result<Credentials, LoginFailure> {
    let auth_token = client.authenticate(email, password).await?;
    Ok(Credentials {
        title: "Cosa".to_string(),
        auth_token,
    })
}
