use thiserror::Error;

use crate::address::{Address, AddressError};
use crate::client::ClientError;
use crate::config::ConfigError;
use crate::keys::KeyError;

/// Errors raised by the escrow program itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("invalid instruction")]
    InvalidInstruction,
    #[error("not enough account keys for instruction")]
    NotEnoughAccountKeys,
    #[error("escrow record has malformed length {0}")]
    MalformedRecord(usize),
    #[error("escrow record already initialized")]
    AlreadyInitialized,
    #[error("escrow record not initialized")]
    RecordNotInitialized,
    #[error("required signer missing or not the recorded initializer")]
    Unauthorized,
    #[error("escrow storage is {actual} bytes, layout requires {expected}")]
    StorageSizeMismatch { expected: usize, actual: usize },
    #[error("account is not rent exempt")]
    NotRentExempt,
    #[error("program-derived authority does not match its derivation")]
    InvalidAuthority,
    #[error("account {0} does not match the escrow record")]
    AccountMismatch(Address),
    #[error("expected {expected} units, holding account has {actual}")]
    AmountMismatch { expected: u64, actual: u64 },
    #[error("payment account holds {available}, {required} required")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("holding account is empty")]
    EmptyDeposit,
    #[error("account is not owned by the expected program")]
    IncorrectProgramId,
    #[error("escrow record is not owned by this program")]
    InvalidAccountOwner,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token instruction")]
    InvalidInstruction,
    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("account mint does not match")]
    MintMismatch,
    #[error("authority does not own the account")]
    OwnerMismatch,
    #[error("token state is uninitialized")]
    UninitializedState,
    #[error("token state already in use")]
    AlreadyInUse,
    #[error("cannot close an account holding {0} tokens")]
    NonEmptyAccount(u64),
    #[error("token account data is invalid")]
    InvalidAccountData,
    #[error("operation overflowed")]
    Overflow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("invalid system instruction")]
    InvalidInstruction,
    #[error("account {0} already in use")]
    AccountAlreadyInUse(Address),
    #[error("insufficient lamports: {available} available, {required} required")]
    ResultWithNegativeLamports { required: u64, available: u64 },
    #[error("account below rent-exempt minimum of {0} lamports")]
    NotRentExempt(u64),
}

/// Runtime rule violations, and program errors surfaced through the runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstructionError {
    #[error("missing required signature for {0}")]
    MissingRequiredSignature(Address),
    #[error("instruction modified read-only account {0}")]
    ReadonlyDataModified(Address),
    #[error("instruction modified data of account {0} it does not own")]
    ExternalAccountDataModified(Address),
    #[error("instruction spent lamports of account {0} it does not own")]
    ExternalAccountLamportSpend(Address),
    #[error("instruction changed the owner of account {0}")]
    ModifiedProgramId(Address),
    #[error("sum of account balances before and after instruction do not match")]
    UnbalancedInstruction,
    #[error("account {0} is not a deployed program")]
    UnsupportedProgramId(Address),
    #[error("account {0} was not passed to the invoking instruction")]
    MissingAccount(Address),
    #[error("cross-program invocation escalates privileges of {0}")]
    PrivilegeEscalation(Address),
    #[error("cross-program invocation exceeds depth limit")]
    CallDepth,
    #[error("invalid program-derived signer seeds")]
    InvalidSeeds,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("escrow program: {0}")]
    Escrow(#[from] EscrowError),
    #[error("token program: {0}")]
    Token(#[from] TokenError),
    #[error("system program: {0}")]
    System(#[from] SystemError),
}

impl From<AddressError> for InstructionError {
    fn from(_: AddressError) -> Self {
        InstructionError::InvalidSeeds
    }
}

impl InstructionError {
    /// The escrow program error, if that is what failed.
    pub fn escrow_error(&self) -> Option<&EscrowError> {
        match self {
            InstructionError::Escrow(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no instructions")]
    Empty,
    #[error("signature verification failed for {0}")]
    SignatureFailure(Address),
    #[error("missing signature for fee payer {0}")]
    MissingFeePayerSignature(Address),
    #[error("instruction {index} failed: {error}")]
    InstructionError { index: usize, error: InstructionError },
    #[error("fault injected after instruction {0}")]
    InjectedFault(usize),
}

impl TransactionError {
    pub fn instruction_error(&self) -> Option<&InstructionError> {
        match self {
            TransactionError::InstructionError { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn escrow_error(&self) -> Option<&EscrowError> {
        self.instruction_error().and_then(InstructionError::escrow_error)
    }
}

/// A post-transaction re-read disagreed with what the flow just submitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("could not find escrow at {0}")]
    EscrowMissing(Address),
    #[error("escrow state initialization flag has not been set")]
    NotInitialized,
    #[error("initializer is {found}, expected {expected}")]
    InitializerMismatch { expected: Address, found: Address },
    #[error("initializer receive account is {found}, expected {expected}")]
    ReceiveAccountMismatch { expected: Address, found: Address },
    #[error("temp token account is {found}, expected {expected}")]
    TempAccountMismatch { expected: Address, found: Address },
    #[error("expected amount is {found}, expected {expected}")]
    ExpectedAmountMismatch { expected: u64, found: u64 },
    #[error("temp token account is controlled by {found}, expected program authority {expected}")]
    TempAuthorityMismatch { expected: Address, found: Address },
    #[error("temp token account holds {found}, expected {expected}")]
    DepositMismatch { expected: u64, found: u64 },
    #[error("escrow account {0} has not been closed")]
    EscrowNotClosed(Address),
    #[error("temp token account {0} has not been closed")]
    TempNotClosed(Address),
    #[error("token account {0} no longer exists")]
    TokenAccountMissing(Address),
    #[error("balance of {account} is {found}, expected {expected}")]
    BalanceMismatch { account: Address, expected: u64, found: u64 },
}

/// Errors surfaced by the off-ledger flows.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("escrow record at {address} is unreadable: {error}")]
    Record { address: Address, error: EscrowError },
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),
}

impl FlowError {
    pub fn verification(&self) -> Option<&VerificationError> {
        match self {
            FlowError::Verification(e) => Some(e),
            _ => None,
        }
    }
}
