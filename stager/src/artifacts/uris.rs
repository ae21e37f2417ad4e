//! Staging URIs handed to workers

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::errors::StagerError;

/// Builds the download/upload URIs of a staging request
#[derive(Debug, Clone)]
pub struct StagingUris {
    base: Url,
}

impl StagingUris {
    /// Create from the externally reachable base URL.
    ///
    /// When a user is given, the credentials are embedded in every URI.
    pub fn new(
        base_url: &str,
        user: Option<&str>,
        password: Option<&SecretString>,
    ) -> Result<Self, StagerError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| StagerError::ConfigError(format!("Invalid external URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StagerError::ConfigError(format!(
                "External URL cannot be a base: {base_url}"
            )));
        }

        if let Some(user) = user {
            base.set_username(user)
                .map_err(|_| StagerError::ConfigError("Cannot set staging user".to_string()))?;
            base.set_password(password.map(|p| p.expose_secret()))
                .map_err(|_| StagerError::ConfigError("Cannot set staging password".to_string()))?;
        }

        Ok(Self { base })
    }

    pub fn app_uri(&self, app_id: &str) -> String {
        self.join(&["staging", "apps", app_id])
    }

    pub fn droplet_upload_uri(&self, app_id: &str) -> String {
        self.join(&["staging", "droplets", app_id])
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}
