use borsh::{BorshDeserialize, BorshSerialize};

use crate::address::{Address, SYSTEM_PROGRAM_ID};
use crate::error::{InstructionError, SystemError};
use crate::instruction::{AccountMeta, Instruction};
use crate::runtime::InvokeContext;
use crate::storage::Account;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SystemInstruction {
    /// 0. `[writable, signer]` funding account
    /// 1. `[writable, signer]` new account
    CreateAccount {
        lamports: u64,
        space: u64,
        owner: Address,
    },
    /// 0. `[writable, signer]` source
    /// 1. `[writable]` destination
    Transfer { lamports: u64 },
}

pub fn create_account(from: Address, to: Address, lamports: u64, space: u64, owner: Address) -> Instruction {
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(from, true), AccountMeta::new(to, true)],
        data: borsh::to_vec(&SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        })
        .unwrap_or_default(),
    }
}

pub fn transfer(from: Address, to: Address, lamports: u64) -> Instruction {
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(from, true), AccountMeta::new(to, false)],
        data: borsh::to_vec(&SystemInstruction::Transfer { lamports }).unwrap_or_default(),
    }
}

pub(crate) fn process(
    ctx: &mut InvokeContext<'_>,
    accounts: &[AccountMeta],
    data: &[u8],
) -> Result<(), InstructionError> {
    let instruction =
        SystemInstruction::try_from_slice(data).map_err(|_| SystemError::InvalidInstruction)?;
    let [from, to, ..] = accounts else {
        return Err(SystemError::InvalidInstruction.into());
    };

    match instruction {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => {
            ctx.log("Instruction: CreateAccount");
            let existing = ctx.account(&to.address);
            if existing.exists() || !existing.data.is_empty() || existing.owner != SYSTEM_PROGRAM_ID {
                return Err(SystemError::AccountAlreadyInUse(to.address).into());
            }
            let minimum = ctx.rent().minimum_balance(space as usize);
            if lamports < minimum {
                return Err(SystemError::NotRentExempt(minimum).into());
            }
            debit(ctx, from.address, lamports)?;
            ctx.set_account(to.address, Account::new(lamports, space as usize, owner))
        }
        SystemInstruction::Transfer { lamports } => {
            ctx.log("Instruction: Transfer");
            debit(ctx, from.address, lamports)?;
            let mut destination = ctx.account(&to.address);
            destination.lamports = destination
                .lamports
                .checked_add(lamports)
                .ok_or(InstructionError::ArithmeticOverflow)?;
            ctx.set_account(to.address, destination)
        }
    }
}

fn debit(ctx: &mut InvokeContext<'_>, address: Address, lamports: u64) -> Result<(), InstructionError> {
    let mut source = ctx.account(&address);
    if !source.data.is_empty() {
        return Err(SystemError::InvalidInstruction.into());
    }
    source.lamports = source.lamports.checked_sub(lamports).ok_or(
        SystemError::ResultWithNegativeLamports {
            required: lamports,
            available: source.lamports,
        },
    )?;
    ctx.set_account(address, source)
}
