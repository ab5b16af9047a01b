//! Node identity — the long-term X25519 keypair and the device's declared capability.
//!
//! The public key is carried in handshakes and neighbour records as lowercase
//! hex. It is never used to authenticate a peer.

use std::path::Path;

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Function tags a node may declare. Discovery ignores anything else.
pub const KNOWN_FUNCTIONS: &[&str] = &[
    "disaster-imaging",
    "whale-tracking",
    "windfarm-monitoring",
    "post-flood-survivor-detection-aerialdrones",
    "basestation",
];

pub fn is_known_function(function: &str) -> bool {
    KNOWN_FUNCTIONS.contains(&function)
}

/// Device name used when none is configured.
pub fn default_device_name(port: u16) -> String {
    format!("sat-{port}")
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A node's static X25519 keypair. Private bytes are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    private: Zeroizing<[u8; 32]>,
    pub public: [u8; 32],
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct from stored private key bytes; the public half is derived.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.private)
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    /// Load the keypair stored at `path`, or generate one and write it there.
    ///
    /// The file holds the 32 raw private bytes.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let bytes = std::fs::read(path).map_err(|e| IdentityError::ReadFailed {
                path: path.display().to_string(),
                source: e,
            })?;
            let private: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::BadKeyLength(bytes.len()))?;
            return Ok(Self::from_private(private));
        }

        let keypair = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IdentityError::WriteFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, keypair.private_bytes().as_slice()).map_err(|e| {
            IdentityError::WriteFailed {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(keypair)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read keypair {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write keypair {path}: {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("keypair file must hold 32 bytes, found {0}")]
    BadKeyLength(usize),
}
