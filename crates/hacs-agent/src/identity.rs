//! Device identity management
//!
//! Each installation owns one Ed25519 keypair that identifies the device to
//! the pairing service. The keypair is generated on first start and reused
//! on every later start until it is explicitly wiped.
//!
//! Layout of the identity directory (owner-only permissions on Unix):
//! - `device.key`: 64 bytes, secret seed followed by the public key
//! - `device.pub`: 32 bytes, the public key

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ed25519_dalek::{SigningKey, VerifyingKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use hacs_core::error::IdentityError;

/// File name of the private key inside the identity directory
pub const PRIVATE_KEY_FILE: &str = "device.key";

/// File name of the public key inside the identity directory
pub const PUBLIC_KEY_FILE: &str = "device.pub";

/// The device's Ed25519 keypair
pub struct DeviceIdentity {
    signing_key: SigningKey,
}

impl DeviceIdentity {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.verifying_key().to_bytes()
    }

    /// Lowercase hex of the public key, as sent to the pairing service
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Short identifier for logs (first 16 hex chars of SHA-256 of the public key)
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.public_key_bytes());
        hex::encode(&digest[..8])
    }

    fn keypair_bytes(&self) -> Zeroizing<[u8; KEYPAIR_LENGTH]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Persistent storage for the device keypair
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    /// Store rooted at `dir` (created on first use)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Identity directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `device.key`
    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    /// Path of `device.pub`
    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    /// Load the persisted keypair, generating and persisting one if none exists.
    ///
    /// Persisted key material that cannot be read, has the wrong size, or
    /// does not form a consistent keypair is an error; it is never silently
    /// replaced. A missing `device.pub` is re-derived from `device.key`.
    pub fn load_or_create(&self) -> Result<DeviceIdentity, IdentityError> {
        let private_path = self.private_key_path();
        let public_path = self.public_key_path();

        let private = read_key_file(&private_path, KEYPAIR_LENGTH)?;
        let public = read_key_file(&public_path, PUBLIC_KEY_LENGTH)?;

        match (private, public) {
            (None, None) => self.create(),
            (None, Some(_)) => Err(IdentityError::MissingPrivateKey { path: private_path }),
            (Some(private), public) => {
                let keypair = <&[u8; KEYPAIR_LENGTH]>::try_from(private.as_slice()).map_err(
                    |_| IdentityError::Corrupt {
                        path: private_path.clone(),
                        expected: KEYPAIR_LENGTH,
                        actual: private.len(),
                    },
                )?;
                let signing_key = SigningKey::from_keypair_bytes(keypair).map_err(|e| {
                    IdentityError::InvalidKey {
                        path: private_path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let identity = DeviceIdentity { signing_key };

                match public {
                    Some(public) if public.as_slice() == identity.public_key_bytes().as_slice() => {}
                    Some(_) => return Err(IdentityError::Mismatch { path: public_path }),
                    None => {
                        tracing::warn!(
                            "Public key missing at {:?}, re-deriving it from the private key",
                            public_path
                        );
                        write_key_file(&public_path, &identity.public_key_bytes())?;
                    }
                }

                tracing::info!("Loaded existing device keys ({})", identity.fingerprint());
                Ok(identity)
            }
        }
    }

    /// Remove both key files. The next `load_or_create` generates a new identity.
    pub fn wipe(&self) -> Result<(), IdentityError> {
        for path in [self.private_key_path(), self.public_key_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(IdentityError::Io { path, source }),
            }
        }
        Ok(())
    }

    fn create(&self) -> Result<DeviceIdentity, IdentityError> {
        create_private_dir(&self.dir).map_err(|source| IdentityError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let identity = DeviceIdentity::generate();
        write_key_file(&self.private_key_path(), identity.keypair_bytes().as_slice())?;
        write_key_file(&self.public_key_path(), &identity.public_key_bytes())?;

        tracing::info!(
            "Generated new device keys ({}) in {:?}",
            identity.fingerprint(),
            self.dir
        );
        Ok(identity)
    }
}

/// Read a key file, `Ok(None)` if it does not exist
fn read_key_file(
    path: &Path,
    expected: usize,
) -> Result<Option<Zeroizing<Vec<u8>>>, IdentityError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IdentityError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if meta.file_type().is_symlink() {
        return Err(IdentityError::Symlink {
            path: path.to_path_buf(),
        });
    }

    let bytes = Zeroizing::new(std::fs::read(path).map_err(|source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    })?);

    if bytes.len() != expected {
        return Err(IdentityError::Corrupt {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len(),
        });
    }

    Ok(Some(bytes))
}

/// Create a new key file readable and writable by the owner only
fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    let io_err = |source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    };

    #[cfg(unix)]
    let mut file = {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .map_err(io_err)?
    };

    #[cfg(not(unix))]
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;

    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}
