// Version information for the Fabstir LLM Relay

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-envelope-relay-2025-08-07";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.1.0";

/// Build date
pub const BUILD_DATE: &str = "2025-08-07";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "hybrid-envelope-encryption",
    "rsa-oaep-key-transport",
    "aes-256-gcm",
    "key-rotation",
    "rate-limiting",
    "backend-failover",
    "health-probing",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Fabstir LLM Relay {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(FEATURES.contains(&"hybrid-envelope-encryption"));
        assert!(FEATURES.contains(&"backend-failover"));
    }

    #[test]
    fn test_version_string() {
        let version = get_version_string();
        assert!(version.contains(VERSION_NUMBER));
        assert!(version.contains(BUILD_DATE));
    }
}
