//! Trustless two-party token swap.
//!
//! An initializer deposits asset X into a temporary token account whose
//! authority is handed to a keyless address derived from the escrow program.
//! A counterparty later settles the trade in one transaction: its payment in
//! asset Y goes to the initializer and the deposit goes to the counterparty,
//! or nothing happens at all.
//!
//! The ledger the programs run on is modelled in-process ([`runtime::Ledger`])
//! over an injectable [`storage::Storage`].

pub mod address;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod counterparty;
pub mod error;
pub mod escrow;
pub mod initializer;
pub mod instruction;
pub mod keys;
mod processor;
pub mod runtime;
pub mod signatures;
pub mod storage;
pub mod system;
pub mod token;
pub mod utils;

pub use address::{Address, Authority};
pub use client::{LedgerClient, LocalClient, SendOptions};
pub use error::{EscrowError, FlowError, TransactionError, VerificationError};
pub use escrow::{EscrowRecord, EscrowState};
pub use instruction::EscrowInstruction;
pub use runtime::Ledger;
pub use signatures::{Keypair, Transaction};
