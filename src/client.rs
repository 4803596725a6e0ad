//! The ledger as seen from off-ledger code: submit signed transactions, read
//! accounts back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::address::{find_program_address, Address, AddressError, TOKEN_PROGRAM_ID};
use crate::error::TransactionError;
use crate::runtime::{Ledger, LedgerError, TransactionOutcome};
use crate::signatures::{Keypair, Transaction};
use crate::storage::{Account, MemoryStorage, Storage, StorageError};
use crate::token::{Pack, TokenAccount};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("preflight simulation failed: {0}")]
    Preflight(TransactionError),
    #[error("transaction failed: {0}")]
    Transaction(TransactionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("account {0} is not a token account")]
    NotTokenAccount(Address),
    #[error("address derivation failed: {0}")]
    Address(#[from] AddressError),
}

impl From<LedgerError> for ClientError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Transaction(e) => ClientError::Transaction(e),
            LedgerError::Storage(e) => ClientError::Storage(e),
        }
    }
}

impl ClientError {
    /// The ledger's rejection, whether caught in preflight or on submission.
    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            ClientError::Preflight(e) | ClientError::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub commitment: Commitment,
}

#[allow(async_fn_in_trait)]
pub trait LedgerClient {
    /// Signs `transaction` with `signers` and submits it as one unit.
    async fn submit(
        &self,
        transaction: Transaction,
        signers: &[&Keypair],
        options: SendOptions,
    ) -> Result<TransactionOutcome, ClientError>;

    async fn get_account(&self, address: &Address) -> Result<Option<Account>, ClientError>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> u64;

    async fn airdrop(&self, address: &Address, lamports: u64) -> Result<(), ClientError>;

    /// Decoded token account, or `None` if nothing lives at `address`.
    async fn get_token_account(&self, address: &Address) -> Result<Option<TokenAccount>, ClientError> {
        let Some(account) = self.get_account(address).await? else {
            return Ok(None);
        };
        if account.owner != TOKEN_PROGRAM_ID {
            return Err(ClientError::NotTokenAccount(*address));
        }
        TokenAccount::unpack(&account.data)
            .map(Some)
            .map_err(|_| ClientError::NotTokenAccount(*address))
    }

    async fn get_token_balance(&self, address: &Address) -> Result<Option<u64>, ClientError> {
        Ok(self.get_token_account(address).await?.map(|a| a.amount))
    }

    fn derive_address(&self, seeds: &[&[u8]], program_id: &Address) -> Result<(Address, u8), ClientError> {
        Ok(find_program_address(seeds, program_id)?)
    }
}

/// Client for a ledger living in this process.
pub struct LocalClient<S: Storage = MemoryStorage> {
    ledger: Arc<Mutex<Ledger<S>>>,
}

impl<S: Storage> Clone for LocalClient<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<S: Storage> LocalClient<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Direct access to the ledger, for setup and test harnesses.
    pub async fn ledger(&self) -> MutexGuard<'_, Ledger<S>> {
        self.ledger.lock().await
    }
}

impl<S: Storage> LedgerClient for LocalClient<S> {
    async fn submit(
        &self,
        mut transaction: Transaction,
        signers: &[&Keypair],
        options: SendOptions,
    ) -> Result<TransactionOutcome, ClientError> {
        transaction.sign(signers);
        let mut ledger = self.ledger.lock().await;
        if !options.skip_preflight {
            ledger.simulate(&transaction).map_err(ClientError::Preflight)?;
        }
        // Commits synchronously, which satisfies every commitment level.
        Ok(ledger.process_transaction(&transaction)?)
    }

    async fn get_account(&self, address: &Address) -> Result<Option<Account>, ClientError> {
        Ok(self.ledger.lock().await.get_account(address))
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> u64 {
        self.ledger.lock().await.rent().minimum_balance(data_len)
    }

    async fn airdrop(&self, address: &Address, lamports: u64) -> Result<(), ClientError> {
        Ok(self.ledger.lock().await.airdrop(*address, lamports)?)
    }
}
