pub mod config;
pub mod error;
pub mod repository;
pub mod types;

pub use error::{CustodyError, CustodyResult};
pub use repository::{ProjectRepository, ShareRepository};
pub use types::{EncryptionParameters, Entropy, MigrationRecord, PasskeyReference, Project, Share};

/// Current Unix time in seconds.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
