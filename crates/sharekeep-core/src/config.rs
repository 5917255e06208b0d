use serde::{Deserialize, Serialize};

/// Top-level configuration (loaded from sharekeep.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SharekeepConfig {
    pub log: LogConfig,
    pub key_parts: KeyPartConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Ephemeral session key-part store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPartConfig {
    /// Seconds a registered project part stays redeemable (0 = no expiry)
    pub ttl_secs: u64,
    /// Upper bound on pending sessions; the oldest are evicted first
    pub max_entries: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether session key assembly is gated behind an external OTP check
    pub otp_required: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for KeyPartConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_entries: 10_000,
        }
    }
}
