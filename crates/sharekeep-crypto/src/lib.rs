//! sharekeep-crypto: key material handling for the share custody service
//!
//! Every value that crosses this crate's API is base64 (standard alphabet)
//! text, which is the format the repositories persist.
//!
//! Key custody:
//! ```text
//! Project master key (256-bit random)
//!   ├── SSS 2-of-2 split
//!   │   ├── stored part  = [0x01][y..]  (persisted server side)
//!   │   └── project part = [0x02][y..]  (handed to the tenant, never persisted)
//!   └── Share secrets: XChaCha20-Poly1305 (key=master, nonce=random_192bit)
//! ```
//!
//! Projects created before the SSS scheme hold XOR-split parts; those are
//! reconstructed with [`ReconstructionStrategy::Legacy`] until the project
//! is migrated.

pub mod cipher;
pub mod error;
pub mod key;
pub mod sharing;

pub use cipher::{decrypt, encrypt, Cipher};
pub use error::{CryptoError, CryptoResult};
pub use key::{generate_key, EncryptionKey};
pub use sharing::{ReconstructionStrategy, SplitKey, SPLIT_RETRIES};

/// Size of a project master key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
