use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Repository coordinates safe to expose to the browser
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepositorySummary {
    pub username: String,
    pub repository: String,
    pub folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always "OK" when the server answers
    pub status: String,
    pub config: RepositorySummary,
}

/// Limits the upload page enforces before submitting
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    pub username: String,
    pub repository: String,
    pub folder: String,
    pub max_files: usize,
    /// Human readable, e.g. "5MB"
    pub max_size: String,
    pub max_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyConfigResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Format a byte count the way the upload page displays limits: whole MiB as "5MB", otherwise
/// KiB or bytes.
pub fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::human_size;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(5 * 1024 * 1024), "5MB");
        assert_eq!(human_size(512 * 1024), "512KB");
        assert_eq!(human_size(1000), "1000B");
    }
}
