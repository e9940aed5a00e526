//! Signing credential for the swept wallet
//!
//! Loads a Solana CLI keypair file (JSON array of 64 bytes) or generates a
//! throwaway keypair. The keypair is shared read-only for the process lifetime.

use std::path::Path;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The custodial wallet: public address plus signing capability
#[derive(Clone)]
pub struct Wallet {
    keypair: Arc<Keypair>,
}

impl Wallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Generate a fresh keypair that only lives in memory
    ///
    /// Funds sent to a generated wallet are lost when the process exits
    /// unless a sweep moved them out first.
    pub fn generate() -> Self {
        let wallet = Self::new(Keypair::new());
        warn!(
            "No keypair configured - generated ephemeral wallet {}",
            wallet.address()
        );
        wallet
    }

    /// Load a keypair file, refusing files readable by group or others
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading keypair from: {:?}", path);

        // Validate permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(Error::InsecureKeypair(format!(
                        "Keypair {} has insecure permissions {:o}. Run 'chmod 600 {}'",
                        path.display(),
                        mode & 0o777,
                        path.display()
                    )));
                }
            }
        }

        let bytes = std::fs::read(path).map_err(|e| {
            Error::InvalidKeypair(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let secret: Vec<u8> = serde_json::from_slice(&bytes).map_err(|e| {
            Error::InvalidKeypair(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let keypair = Keypair::from_bytes(&secret)
            .map_err(|e| Error::InvalidKeypair(format!("Invalid keypair bytes: {}", e)))?;

        let wallet = Self::new(keypair);
        info!("Loaded wallet {}", wallet.address());
        Ok(wallet)
    }

    /// Load from `path` when given, otherwise generate
    pub fn load_or_generate(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(Path::new(p)),
            None => Ok(Self::generate()),
        }
    }

    /// Write the keypair in Solana CLI format with owner-only permissions
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(Error::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        let json = serde_json::to_string(&self.keypair.to_bytes().to_vec())?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            file.write_all(json.as_bytes())?;
        }

        #[cfg(not(unix))]
        std::fs::write(path, json)?;

        info!("Wrote keypair for {} to {}", self.address(), path.display());
        Ok(())
    }

    /// Public deposit address
    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Signing capability
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_load_keeps_address() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id.json");

        let wallet = Wallet::new(Keypair::new());
        wallet.write(&path, false).unwrap();

        let loaded = Wallet::load(&path).unwrap();
        assert_eq!(loaded.address(), wallet.address());
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id.json");

        Wallet::new(Keypair::new()).write(&path, false).unwrap();
        assert!(Wallet::new(Keypair::new()).write(&path, false).is_err());
        assert!(Wallet::new(Keypair::new()).write(&path, true).is_ok());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }

        let err = Wallet::load(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidKeypair(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("id.json");
        Wallet::new(Keypair::new()).write(&path, false).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = Wallet::load(&path).unwrap_err();
        assert!(matches!(err, Error::InsecureKeypair(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Wallet::load(Path::new("/nonexistent/id.json")).unwrap_err();
        assert!(err.is_configuration());
    }
}
