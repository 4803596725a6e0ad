//! Named key registry on disk.
//!
//! `<name>_pub.json` holds the base58 address as a JSON string and
//! `<name>.json` holds the 64-byte keypair as a JSON array of numbers.

use std::path::{Path, PathBuf};

use crate::address::Address;
use crate::signatures::Keypair;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key '{name}' not found at {path}")]
    Missing { name: String, path: PathBuf },
    #[error("key file {0} is malformed")]
    Malformed(PathBuf),
    #[error("keypair '{0}' does not match its registered public key")]
    PublicKeyMismatch(String),
    #[error("Given programId is missing or incorrect")]
    ProgramId,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn public_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_pub.json"))
    }

    fn keypair_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, name: &str, path: &Path) -> Result<String, KeyError> {
        std::fs::read_to_string(path).map_err(|_| KeyError::Missing {
            name: name.to_string(),
            path: path.to_path_buf(),
        })
    }

    fn write(&self, path: &Path, contents: String) -> Result<(), KeyError> {
        let io = |source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io)?;
        std::fs::write(path, contents).map_err(io)
    }

    pub fn write_public_key(&self, name: &str, address: &Address) -> Result<(), KeyError> {
        let path = self.public_path(name);
        let json = serde_json::to_string(address).map_err(|_| KeyError::Malformed(path.clone()))?;
        self.write(&path, json)
    }

    pub fn get_public_key(&self, name: &str) -> Result<Address, KeyError> {
        let path = self.public_path(name);
        let raw = self.read(name, &path)?;
        serde_json::from_str(&raw).map_err(|_| KeyError::Malformed(path))
    }

    /// Writes both the keypair and its public half.
    pub fn write_keypair(&self, name: &str, keypair: &Keypair) -> Result<(), KeyError> {
        let path = self.keypair_path(name);
        let json = serde_json::to_string(&keypair.to_bytes().to_vec())
            .map_err(|_| KeyError::Malformed(path.clone()))?;
        self.write(&path, json)?;
        self.write_public_key(name, &keypair.address())
    }

    pub fn get_keypair(&self, name: &str) -> Result<Keypair, KeyError> {
        let path = self.keypair_path(name);
        let raw = self.read(name, &path)?;
        let bytes: Vec<u8> = serde_json::from_str(&raw).map_err(|_| KeyError::Malformed(path.clone()))?;
        let keypair = Keypair::from_bytes(&bytes).ok_or(KeyError::Malformed(path))?;
        if keypair.address() != self.get_public_key(name)? {
            return Err(KeyError::PublicKeyMismatch(name.to_string()));
        }
        Ok(keypair)
    }

    pub fn get_program_id(&self) -> Result<Address, KeyError> {
        self.get_public_key("program").map_err(|_| KeyError::ProgramId)
    }
}
