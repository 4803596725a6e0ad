use borsh::{BorshDeserialize, BorshSerialize};

use crate::address::{Address, SYSVAR_RENT_ID, TOKEN_PROGRAM_ID};
use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: false,
        }
    }
}

/// A call into one program. The program reads `accounts` positionally.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowInstruction {
    /// Opens a trade: records the terms in the escrow account and hands the
    /// temp token account over to the program's derived authority.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer]` initializer
    /// 1. `[writable]` temp token account, funded and still owned by the initializer
    /// 2. `[]` initializer's token account that receives the counterparty's asset
    /// 3. `[writable]` escrow account, allocated to this program
    /// 4. `[]` rent sysvar
    /// 5. `[]` token program
    InitEscrow {
        /// Amount the initializer expects to receive.
        amount: u64,
    },

    /// Settles a trade.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer]` counterparty
    /// 1. `[writable]` counterparty's token account it pays from
    /// 2. `[writable]` counterparty's token account that receives the deposit
    /// 3. `[writable]` temp token account, closed afterwards
    /// 4. `[writable]` initializer's main account, receives the rent back
    /// 5. `[writable]` initializer's receive token account
    /// 6. `[writable]` escrow account, closed afterwards
    /// 7. `[]` token program
    /// 8. `[]` program-derived authority
    Exchange {
        /// Amount the counterparty expects to be paid out of the temp account.
        amount: u64,
    },

    /// Withdraws an open trade and returns the deposit to the initializer.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer, writable]` initializer
    /// 1. `[writable]` temp token account, closed afterwards
    /// 2. `[writable]` initializer's token account the deposit returns to
    /// 3. `[writable]` escrow account, closed afterwards
    /// 4. `[]` token program
    /// 5. `[]` program-derived authority
    Cancel,
}

impl EscrowInstruction {
    pub const INIT_ESCROW: u8 = 0;
    pub const EXCHANGE: u8 = 1;
    pub const CANCEL: u8 = 2;

    /// Unpack a byte buffer into a [EscrowInstruction]
    pub fn unpack(input: &[u8]) -> Result<Self, EscrowError> {
        let (tag, rest) = input.split_first().ok_or(EscrowError::InvalidInstruction)?;

        Ok(match *tag {
            Self::INIT_ESCROW => Self::InitEscrow {
                amount: Self::unpack_amount(rest)?,
            },
            Self::EXCHANGE => Self::Exchange {
                amount: Self::unpack_amount(rest)?,
            },
            Self::CANCEL if rest.is_empty() => Self::Cancel,
            _ => return Err(EscrowError::InvalidInstruction),
        })
    }

    fn unpack_amount(input: &[u8]) -> Result<u64, EscrowError> {
        let bytes: [u8; 8] = input
            .try_into()
            .map_err(|_| EscrowError::InvalidInstruction)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn pack(&self) -> Vec<u8> {
        match *self {
            Self::InitEscrow { amount } => Self::pack_with_amount(Self::INIT_ESCROW, amount),
            Self::Exchange { amount } => Self::pack_with_amount(Self::EXCHANGE, amount),
            Self::Cancel => vec![Self::CANCEL],
        }
    }

    fn pack_with_amount(tag: u8, amount: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.push(tag);
        buf.extend_from_slice(&amount.to_le_bytes());
        buf
    }
}

pub fn init_escrow(
    program_id: Address,
    initializer: Address,
    temp_token_account: Address,
    initializer_receive_account: Address,
    escrow_account: Address,
    amount: u64,
) -> Instruction {
    Instruction {
        program_id,
        accounts: vec![
            AccountMeta::new_readonly(initializer, true),
            AccountMeta::new(temp_token_account, false),
            AccountMeta::new_readonly(initializer_receive_account, false),
            AccountMeta::new(escrow_account, false),
            AccountMeta::new_readonly(SYSVAR_RENT_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: EscrowInstruction::InitEscrow { amount }.pack(),
    }
}

/// Accounts named by an Exchange, in the order the program reads them.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeKeys {
    pub counterparty: Address,
    pub counterparty_payment_account: Address,
    pub counterparty_receive_account: Address,
    pub temp_token_account: Address,
    pub initializer: Address,
    pub initializer_receive_account: Address,
    pub escrow_account: Address,
    pub pda: Address,
}

pub fn exchange(program_id: Address, accounts: ExchangeKeys, amount: u64) -> Instruction {
    Instruction {
        program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.counterparty, true),
            AccountMeta::new(accounts.counterparty_payment_account, false),
            AccountMeta::new(accounts.counterparty_receive_account, false),
            AccountMeta::new(accounts.temp_token_account, false),
            AccountMeta::new(accounts.initializer, false),
            AccountMeta::new(accounts.initializer_receive_account, false),
            AccountMeta::new(accounts.escrow_account, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(accounts.pda, false),
        ],
        data: EscrowInstruction::Exchange { amount }.pack(),
    }
}

pub fn cancel(
    program_id: Address,
    initializer: Address,
    temp_token_account: Address,
    refund_account: Address,
    escrow_account: Address,
    pda: Address,
) -> Instruction {
    Instruction {
        program_id,
        accounts: vec![
            AccountMeta::new(initializer, true),
            AccountMeta::new(temp_token_account, false),
            AccountMeta::new(refund_account, false),
            AccountMeta::new(escrow_account, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(pda, false),
        ],
        data: EscrowInstruction::Cancel.pack(),
    }
}
