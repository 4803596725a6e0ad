//! In-process ledger: executes signed transactions against [`Storage`] with
//! all-or-nothing semantics.
//!
//! Instructions run against a staged overlay of writes. The overlay reaches
//! storage only once every instruction of the transaction has succeeded, so a
//! failure at any point leaves no trace. The ownership rules a real ledger
//! enforces are checked on every write:
//!
//! - only accounts the current instruction marks writable may change;
//! - only the owning program may change an account's data or owner, or debit it;
//! - every instruction conserves the total lamports of the accounts it names;
//! - signer flags must be backed by a transaction signature or, inside a
//!   cross-program invocation, by seeds the invoking program derives.

use std::collections::BTreeMap;

use crate::address::{create_program_address, Address, LOADER_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::error::{InstructionError, TransactionError};
use crate::instruction::{AccountMeta, Instruction};
use crate::signatures::{Signature, Transaction};
use crate::storage::{Account, MemoryStorage, Storage, StorageError};
use crate::{processor, system, token};

/// Marker stored in the data of a deployed escrow program account.
pub const ESCROW_PROGRAM_TAG: &[u8] = b"escrow_swap";

pub const MAX_CPI_DEPTH: usize = 4;

const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rent {
    pub lamports_per_byte_year: u64,
    pub exemption_threshold: u64,
}

impl Default for Rent {
    fn default() -> Self {
        Self {
            lamports_per_byte_year: 3480,
            exemption_threshold: 2,
        }
    }
}

impl Rent {
    pub fn minimum_balance(&self, data_len: usize) -> u64 {
        (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
            * self.lamports_per_byte_year
            * self.exemption_threshold
    }

    pub fn is_exempt(&self, lamports: u64, data_len: usize) -> bool {
        lamports >= self.minimum_balance(data_len)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub signature: Option<Signature>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramKind {
    System,
    Token,
    Escrow,
}

struct Frame {
    program_id: Address,
    accounts: Vec<AccountMeta>,
}

impl Frame {
    fn is_writable(&self, address: &Address) -> bool {
        self.accounts
            .iter()
            .any(|m| &m.address == address && m.is_writable)
    }

    fn contains(&self, address: &Address) -> bool {
        self.accounts.iter().any(|m| &m.address == address)
    }
}

/// Execution state shared by every instruction of one transaction.
pub struct InvokeContext<'a> {
    base: &'a dyn Storage,
    writes: BTreeMap<Address, Account>,
    stack: Vec<Frame>,
    logs: Vec<String>,
    rent: Rent,
}

impl<'a> InvokeContext<'a> {
    fn new(base: &'a dyn Storage, rent: Rent) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
            stack: Vec::new(),
            logs: Vec::new(),
            rent,
        }
    }

    pub fn rent(&self) -> Rent {
        self.rent
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    /// Current view of an account; a default system-owned one if absent.
    pub fn account(&self, address: &Address) -> Account {
        self.writes
            .get(address)
            .cloned()
            .or_else(|| self.base.get(address))
            .unwrap_or_else(Account::empty)
    }

    /// Stages a write on behalf of the program currently executing.
    pub fn set_account(&mut self, address: Address, account: Account) -> Result<(), InstructionError> {
        let frame = self.stack.last().ok_or(InstructionError::CallDepth)?;
        let current = self.account(&address);
        if current == account {
            return Ok(());
        }
        if !frame.is_writable(&address) {
            return Err(InstructionError::ReadonlyDataModified(address));
        }
        if current.owner != frame.program_id {
            if current.data != account.data {
                return Err(InstructionError::ExternalAccountDataModified(address));
            }
            if account.lamports < current.lamports {
                return Err(InstructionError::ExternalAccountLamportSpend(address));
            }
            if current.owner != account.owner || current.executable != account.executable {
                return Err(InstructionError::ModifiedProgramId(address));
            }
        }
        self.writes.insert(address, account);
        Ok(())
    }

    /// Moves lamports between two accounts, respecting the write rules.
    pub fn transfer_lamports(&mut self, from: Address, to: Address, lamports: u64) -> Result<(), InstructionError> {
        if from == to {
            return Ok(());
        }
        let mut source = self.account(&from);
        source.lamports = source
            .lamports
            .checked_sub(lamports)
            .ok_or(InstructionError::ArithmeticOverflow)?;
        let mut destination = self.account(&to);
        destination.lamports = destination
            .lamports
            .checked_add(lamports)
            .ok_or(InstructionError::ArithmeticOverflow)?;
        self.set_account(from, source)?;
        self.set_account(to, destination)
    }

    pub fn invoke(&mut self, instruction: &Instruction) -> Result<(), InstructionError> {
        self.invoke_signed(instruction, &[])
    }

    /// Cross-program invocation. The callee inherits the caller's signers and
    /// additionally every program-derived address the caller can re-create
    /// from `signer_seeds` under its own program id.
    pub fn invoke_signed(
        &mut self,
        instruction: &Instruction,
        signer_seeds: &[&[&[u8]]],
    ) -> Result<(), InstructionError> {
        if self.stack.len() >= MAX_CPI_DEPTH {
            return Err(InstructionError::CallDepth);
        }
        let caller = self.stack.last().ok_or(InstructionError::CallDepth)?;

        if !caller.contains(&instruction.program_id) {
            return Err(InstructionError::MissingAccount(instruction.program_id));
        }
        for meta in &instruction.accounts {
            if !caller.contains(&meta.address) {
                return Err(InstructionError::MissingAccount(meta.address));
            }
            if meta.is_writable && !caller.is_writable(&meta.address) {
                return Err(InstructionError::PrivilegeEscalation(meta.address));
            }
        }

        let mut signers: Vec<Address> = caller
            .accounts
            .iter()
            .filter(|m| m.is_signer)
            .map(|m| m.address)
            .collect();
        for seeds in signer_seeds {
            signers.push(create_program_address(seeds, &caller.program_id)?);
        }

        self.process_instruction(instruction, &signers)
    }

    fn program_kind(&self, program_id: &Address) -> Result<ProgramKind, InstructionError> {
        if program_id == &SYSTEM_PROGRAM_ID {
            return Ok(ProgramKind::System);
        }
        if program_id == &TOKEN_PROGRAM_ID {
            return Ok(ProgramKind::Token);
        }
        let account = self.account(program_id);
        if account.executable && account.owner == LOADER_ID && account.data == ESCROW_PROGRAM_TAG {
            return Ok(ProgramKind::Escrow);
        }
        Err(InstructionError::UnsupportedProgramId(*program_id))
    }

    fn lamport_sum(&self, accounts: &[AccountMeta]) -> Result<u128, InstructionError> {
        let mut seen: Vec<Address> = Vec::with_capacity(accounts.len());
        let mut sum: u128 = 0;
        for meta in accounts {
            if seen.contains(&meta.address) {
                continue;
            }
            seen.push(meta.address);
            sum = sum
                .checked_add(self.account(&meta.address).lamports as u128)
                .ok_or(InstructionError::ArithmeticOverflow)?;
        }
        Ok(sum)
    }

    fn process_instruction(
        &mut self,
        instruction: &Instruction,
        signers: &[Address],
    ) -> Result<(), InstructionError> {
        for meta in &instruction.accounts {
            if meta.is_signer && !signers.contains(&meta.address) {
                return Err(InstructionError::MissingRequiredSignature(meta.address));
            }
        }
        let kind = self.program_kind(&instruction.program_id)?;
        let before = self.lamport_sum(&instruction.accounts)?;

        let depth = self.stack.len() + 1;
        self.log(format!("Program {} invoke [{}]", instruction.program_id, depth));
        self.stack.push(Frame {
            program_id: instruction.program_id,
            accounts: instruction.accounts.clone(),
        });

        let program_id = instruction.program_id;
        let accounts = instruction.accounts.as_slice();
        let data = instruction.data.as_slice();
        let result = match kind {
            ProgramKind::System => system::process(self, accounts, data),
            ProgramKind::Token => token::process(self, accounts, data),
            ProgramKind::Escrow => processor::process(self, &program_id, accounts, data),
        };
        self.stack.pop();

        if let Err(error) = result {
            self.log(format!("Program {} failed: {}", program_id, error));
            return Err(error);
        }
        if self.lamport_sum(&instruction.accounts)? != before {
            return Err(InstructionError::UnbalancedInstruction);
        }
        self.log(format!("Program {} success", program_id));
        Ok(())
    }
}

/// A ledger over some [`Storage`], executing transactions atomically.
pub struct Ledger<S: Storage = MemoryStorage> {
    storage: S,
    rent: Rent,
    fault: Option<usize>,
}

impl Default for Ledger<MemoryStorage> {
    fn default() -> Self {
        Self::new(MemoryStorage::new())
    }
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            rent: Rent::default(),
            fault: None,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn rent(&self) -> Rent {
        self.rent
    }

    pub fn get_account(&self, address: &Address) -> Option<Account> {
        self.storage.get(address).filter(Account::exists)
    }

    /// Credits lamports out of thin air, creating a system account if needed.
    pub fn airdrop(&mut self, address: Address, lamports: u64) -> Result<(), StorageError> {
        let mut account = self
            .storage
            .get(&address)
            .unwrap_or_else(Account::empty);
        account.lamports = account.lamports.saturating_add(lamports);
        self.storage.put(address, account);
        self.storage.flush()
    }

    /// Makes `program_id` dispatch to the escrow program.
    pub fn deploy_escrow_program(&mut self, program_id: Address) -> Result<(), StorageError> {
        let account = Account {
            lamports: self.rent.minimum_balance(ESCROW_PROGRAM_TAG.len()),
            owner: LOADER_ID,
            executable: true,
            data: ESCROW_PROGRAM_TAG.to_vec(),
        };
        self.storage.put(program_id, account);
        self.storage.flush()
    }

    /// Test harness: the next processed transaction aborts once
    /// `after_instructions` of its instructions have executed.
    pub fn inject_fault(&mut self, after_instructions: usize) {
        self.fault = Some(after_instructions);
    }

    /// Executes without committing anything.
    pub fn simulate(&self, transaction: &Transaction) -> Result<TransactionOutcome, TransactionError> {
        let (_, outcome) = self.execute(transaction, None)?;
        Ok(outcome)
    }

    pub fn process_transaction(&mut self, transaction: &Transaction) -> Result<TransactionOutcome, LedgerError> {
        let fault = self.fault.take();
        let (writes, outcome) = self.execute(transaction, fault)?;

        for (address, account) in writes {
            if account.exists() {
                self.storage.put(address, account);
            } else {
                self.storage.remove(&address);
            }
        }
        self.storage.flush()?;
        Ok(outcome)
    }

    fn execute(
        &self,
        transaction: &Transaction,
        fault: Option<usize>,
    ) -> Result<(BTreeMap<Address, Account>, TransactionOutcome), TransactionError> {
        if transaction.instructions().is_empty() {
            return Err(TransactionError::Empty);
        }
        let signers = transaction.verify()?;

        let mut ctx = InvokeContext::new(&self.storage, self.rent);
        for (index, instruction) in transaction.instructions().iter().enumerate() {
            if fault == Some(index) {
                return Err(TransactionError::InjectedFault(index));
            }
            ctx.process_instruction(instruction, &signers)
                .map_err(|error| TransactionError::InstructionError { index, error })?;
        }
        if fault == Some(transaction.instructions().len()) {
            return Err(TransactionError::InjectedFault(transaction.instructions().len()));
        }

        let outcome = TransactionOutcome {
            signature: transaction.signatures.first().map(|(_, s)| *s),
            logs: ctx.logs,
        };
        Ok((ctx.writes, outcome))
    }
}
