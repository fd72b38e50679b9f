//! Shared-secret authentication
//!
//! [`Md5Authenticator`] handles the two methods IAX2 peers use in practice:
//! MD5 challenge/response (preferred) and plaintext. RSA challenges are
//! refused.

use tracing::debug;

use crate::collaborators::{AuthReply, Authenticator};
use crate::error::{Iax2Error, Result};
use crate::frame::{AuthMethods, InformationElements};

/// Lower-case hex MD5 of `challenge` followed by `secret`
pub fn md5_response(challenge: &str, secret: &str) -> String {
    let mut context = md5::Context::new();
    context.consume(challenge.as_bytes());
    context.consume(secret.as_bytes());
    format!("{:x}", context.compute())
}

#[derive(Debug, Clone)]
pub struct Md5Authenticator {
    username: Option<String>,
    password: String,
}

impl Md5Authenticator {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            username: None,
            password: password.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl Authenticator for Md5Authenticator {
    fn authenticate(&self, challenge: &InformationElements) -> Result<AuthReply> {
        let methods = challenge.auth_methods.unwrap_or_default();
        let mut ies = InformationElements {
            username: self.username.clone().or_else(|| challenge.username.clone()),
            ..Default::default()
        };

        if methods.contains(AuthMethods::MD5) {
            let nonce = challenge
                .challenge
                .as_deref()
                .ok_or_else(|| Iax2Error::authentication("MD5 requested without a challenge"))?;
            let response = md5_response(nonce, &self.password);
            debug!("answering MD5 challenge");
            ies.md5_result = Some(response.clone());
            return Ok(AuthReply {
                ies,
                encryption_key: Some(response),
            });
        }

        if methods.contains(AuthMethods::PLAINTEXT) {
            debug!("answering with plaintext password");
            ies.password = Some(self.password.clone());
            return Ok(AuthReply {
                ies,
                encryption_key: None,
            });
        }

        Err(Iax2Error::authentication(format!(
            "no supported authentication method in 0x{:x}",
            methods.bits()
        )))
    }
}
