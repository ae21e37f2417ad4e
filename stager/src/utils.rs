//! Utility functions

use serde::{Deserialize, Serialize};

use crate::errors::StagerError;

/// Version information for the stager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Check that an app id can be used as a single path component
pub fn ensure_path_safe(app_id: &str) -> Result<(), StagerError> {
    let unsafe_id = app_id.is_empty()
        || app_id == "."
        || app_id == ".."
        || app_id.contains(['/', '\\', '\0']);
    if unsafe_id {
        return Err(StagerError::ValidationError(format!(
            "Invalid app id: {:?}",
            app_id
        )));
    }
    Ok(())
}

/// Hex encoding utilities
pub mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_path_safe() {
        assert!(ensure_path_safe("3f2a-app").is_ok());
        assert!(ensure_path_safe("").is_err());
        assert!(ensure_path_safe("..").is_err());
        assert!(ensure_path_safe("a/b").is_err());
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex::encode([0x00, 0xab, 0x0f]), "00ab0f");
    }
}
