//! Server state

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::staging::stager::AppStager;

/// Basic-auth credentials guarding the worker-facing staging endpoints
#[derive(Debug)]
pub struct StagingCredentials {
    user: String,
    password: SecretString,
}

impl StagingCredentials {
    pub fn new(user: impl Into<String>, password: SecretString) -> Self {
        Self {
            user: user.into(),
            password,
        }
    }

    /// Check an `Authorization` header value
    pub fn accepts(&self, authorization: &str) -> bool {
        let Some(encoded) = authorization.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, password)) => {
                user == self.user && password == self.password.expose_secret()
            }
            None => false,
        }
    }
}

/// Server state shared across handlers
pub struct ServerState {
    pub stager: Arc<AppStager>,
    pub staging_credentials: Option<StagingCredentials>,
}

impl ServerState {
    pub fn new(stager: Arc<AppStager>, staging_credentials: Option<StagingCredentials>) -> Self {
        Self {
            stager,
            staging_credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials() {
        let creds = StagingCredentials::new("stager", SecretString::from("s3cret"));
        let header = format!("Basic {}", BASE64.encode("stager:s3cret"));
        assert!(creds.accepts(&header));
        assert!(!creds.accepts(&format!("Basic {}", BASE64.encode("stager:wrong"))));
        assert!(!creds.accepts("Bearer token"));
        assert!(!creds.accepts("Basic !!!"));
    }
}
