use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::address::{Address, SYSTEM_PROGRAM_ID};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("ledger file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("account {0} has invalid base64 data")]
    Base64(Address),
}

/// A ledger account. One with zero lamports does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub lamports: u64,
    pub owner: Address,
    pub executable: bool,
    pub data: Vec<u8>,
}

impl Account {
    pub fn new(lamports: u64, space: usize, owner: Address) -> Self {
        Self {
            lamports,
            owner,
            executable: false,
            data: vec![0; space],
        }
    }

    /// What an address with no stored account looks like to a program.
    pub fn empty() -> Self {
        Self::new(0, 0, SYSTEM_PROGRAM_ID)
    }

    pub fn exists(&self) -> bool {
        self.lamports > 0
    }
}

/// Address-keyed account storage.
pub trait Storage {
    fn get(&self, address: &Address) -> Option<Account>;
    fn put(&mut self, address: Address, account: Account);
    fn remove(&mut self, address: &Address);

    /// Persists buffered writes. Called once after every committed transaction.
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    accounts: BTreeMap<Address, Account>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    fn put(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn remove(&mut self, address: &Address) {
        self.accounts.remove(address);
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAccount {
    lamports: u64,
    owner: Address,
    executable: bool,
    data: String,
}

/// JSON snapshot on disk, so separate CLI invocations share one ledger.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    inner: MemoryStorage,
}

impl FileStorage {
    /// Opens the snapshot at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut inner = MemoryStorage::new();

        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            let stored: BTreeMap<Address, StoredAccount> = serde_json::from_str(&raw)?;
            for (address, account) in stored {
                let data = STANDARD
                    .decode(&account.data)
                    .map_err(|_| StorageError::Base64(address))?;
                inner.put(
                    address,
                    Account {
                        lamports: account.lamports,
                        owner: account.owner,
                        executable: account.executable,
                        data,
                    },
                );
            }
        }

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, address: &Address) -> Option<Account> {
        self.inner.get(address)
    }

    fn put(&mut self, address: Address, account: Account) {
        self.inner.put(address, account);
    }

    fn remove(&mut self, address: &Address) {
        self.inner.remove(address);
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let stored: BTreeMap<String, StoredAccount> = self
            .inner
            .iter()
            .map(|(address, account)| {
                (
                    address.to_string(),
                    StoredAccount {
                        lamports: account.lamports,
                        owner: account.owner,
                        executable: account.executable,
                        data: STANDARD.encode(&account.data),
                    },
                )
            })
            .collect();
        let json = serde_json::to_string_pretty(&stored)?;

        // Snapshot is replaced via rename, never written in place.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
