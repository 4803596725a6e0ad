use borsh::{BorshDeserialize, BorshSerialize};

use crate::address::{Address, TOKEN_PROGRAM_ID};
use crate::error::{InstructionError, TokenError};
use crate::instruction::{AccountMeta, Instruction};
use crate::runtime::InvokeContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Mint {
    pub mint_authority: Address,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
}

impl Mint {
    /// 32 + 8 + 1 + 1
    pub const LEN: usize = 42;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TokenAccount {
    pub mint: Address,
    pub owner: Address, // Authority allowed to move or close the balance
    pub amount: u64,
    pub is_initialized: bool,
}

impl TokenAccount {
    /// 32 + 32 + 8 + 1
    pub const LEN: usize = 73;
}

/// Decodes a fixed-size token state, rejecting the zeroed, never-initialized form.
pub trait Pack: Sized + BorshSerialize + BorshDeserialize {
    const LEN: usize;

    fn is_initialized(&self) -> bool;

    fn unpack_unchecked(data: &[u8]) -> Result<Self, TokenError> {
        if data.len() != Self::LEN {
            return Err(TokenError::InvalidAccountData);
        }
        Self::try_from_slice(data).map_err(|_| TokenError::InvalidAccountData)
    }

    fn unpack(data: &[u8]) -> Result<Self, TokenError> {
        let state = Self::unpack_unchecked(data)?;
        if !state.is_initialized() {
            return Err(TokenError::UninitializedState);
        }
        Ok(state)
    }

    fn pack(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }
}

impl Pack for Mint {
    const LEN: usize = Mint::LEN;

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for TokenAccount {
    const LEN: usize = TokenAccount::LEN;

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TokenInstruction {
    /// 0. `[writable]` mint
    InitializeMint {
        decimals: u8,
        mint_authority: Address,
    },
    /// 0. `[writable]` account
    /// 1. `[]` mint
    /// 2. `[]` owner
    InitializeAccount,
    /// 0. `[writable]` mint
    /// 1. `[writable]` destination
    /// 2. `[signer]` mint authority
    MintTo { amount: u64 },
    /// 0. `[writable]` source
    /// 1. `[writable]` destination
    /// 2. `[signer]` source owner
    Transfer { amount: u64 },
    /// 0. `[writable]` account
    /// 1. `[signer]` current owner
    SetAuthority { new_authority: Address },
    /// 0. `[writable]` account, must be empty
    /// 1. `[writable]` destination of the rent lamports
    /// 2. `[signer]` owner
    CloseAccount,
}

fn build(accounts: Vec<AccountMeta>, instruction: TokenInstruction) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts,
        data: borsh::to_vec(&instruction).unwrap_or_default(),
    }
}

pub fn initialize_mint(mint: Address, mint_authority: Address, decimals: u8) -> Instruction {
    build(
        vec![AccountMeta::new(mint, false)],
        TokenInstruction::InitializeMint {
            decimals,
            mint_authority,
        },
    )
}

pub fn initialize_account(account: Address, mint: Address, owner: Address) -> Instruction {
    build(
        vec![
            AccountMeta::new(account, false),
            AccountMeta::new_readonly(mint, false),
            AccountMeta::new_readonly(owner, false),
        ],
        TokenInstruction::InitializeAccount,
    )
}

pub fn mint_to(mint: Address, destination: Address, authority: Address, amount: u64) -> Instruction {
    build(
        vec![
            AccountMeta::new(mint, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(authority, true),
        ],
        TokenInstruction::MintTo { amount },
    )
}

pub fn transfer(source: Address, destination: Address, authority: Address, amount: u64) -> Instruction {
    build(
        vec![
            AccountMeta::new(source, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(authority, true),
        ],
        TokenInstruction::Transfer { amount },
    )
}

pub fn set_authority(account: Address, current_authority: Address, new_authority: Address) -> Instruction {
    build(
        vec![
            AccountMeta::new(account, false),
            AccountMeta::new_readonly(current_authority, true),
        ],
        TokenInstruction::SetAuthority { new_authority },
    )
}

pub fn close_account(account: Address, destination: Address, authority: Address) -> Instruction {
    build(
        vec![
            AccountMeta::new(account, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(authority, true),
        ],
        TokenInstruction::CloseAccount,
    )
}

fn load<T: Pack>(ctx: &InvokeContext<'_>, address: &Address) -> Result<T, TokenError> {
    let account = ctx.account(address);
    if account.owner != TOKEN_PROGRAM_ID {
        return Err(TokenError::InvalidAccountData);
    }
    T::unpack(&account.data)
}

fn store<T: Pack>(ctx: &mut InvokeContext<'_>, address: Address, state: &T) -> Result<(), InstructionError> {
    let mut account = ctx.account(&address);
    account.data = state.pack();
    ctx.set_account(address, account)
}

fn check_owner(expected: &Address, authority: &AccountMeta) -> Result<(), TokenError> {
    if &authority.address != expected || !authority.is_signer {
        return Err(TokenError::OwnerMismatch);
    }
    Ok(())
}

pub(crate) fn process(
    ctx: &mut InvokeContext<'_>,
    accounts: &[AccountMeta],
    data: &[u8],
) -> Result<(), InstructionError> {
    let instruction =
        TokenInstruction::try_from_slice(data).map_err(|_| TokenError::InvalidInstruction)?;

    match instruction {
        TokenInstruction::InitializeMint {
            decimals,
            mint_authority,
        } => {
            ctx.log("Instruction: InitializeMint");
            let [mint, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let raw = ctx.account(&mint.address);
            if raw.owner != TOKEN_PROGRAM_ID {
                return Err(TokenError::InvalidAccountData.into());
            }
            if Mint::unpack_unchecked(&raw.data)?.is_initialized {
                return Err(TokenError::AlreadyInUse.into());
            }
            let state = Mint {
                mint_authority,
                supply: 0,
                decimals,
                is_initialized: true,
            };
            store(ctx, mint.address, &state)
        }
        TokenInstruction::InitializeAccount => {
            ctx.log("Instruction: InitializeAccount");
            let [account, mint, owner, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let raw = ctx.account(&account.address);
            if raw.owner != TOKEN_PROGRAM_ID {
                return Err(TokenError::InvalidAccountData.into());
            }
            if TokenAccount::unpack_unchecked(&raw.data)?.is_initialized {
                return Err(TokenError::AlreadyInUse.into());
            }
            load::<Mint>(ctx, &mint.address)?;
            let state = TokenAccount {
                mint: mint.address,
                owner: owner.address,
                amount: 0,
                is_initialized: true,
            };
            store(ctx, account.address, &state)
        }
        TokenInstruction::MintTo { amount } => {
            ctx.log("Instruction: MintTo");
            let [mint_meta, destination_meta, authority, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let mut mint: Mint = load(ctx, &mint_meta.address)?;
            let mut destination: TokenAccount = load(ctx, &destination_meta.address)?;
            check_owner(&mint.mint_authority, authority)?;
            if destination.mint != mint_meta.address {
                return Err(TokenError::MintMismatch.into());
            }
            mint.supply = mint.supply.checked_add(amount).ok_or(TokenError::Overflow)?;
            destination.amount = destination
                .amount
                .checked_add(amount)
                .ok_or(TokenError::Overflow)?;
            store(ctx, mint_meta.address, &mint)?;
            store(ctx, destination_meta.address, &destination)
        }
        TokenInstruction::Transfer { amount } => {
            ctx.log("Instruction: Transfer");
            let [source_meta, destination_meta, authority, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let mut source: TokenAccount = load(ctx, &source_meta.address)?;
            let mut destination: TokenAccount = load(ctx, &destination_meta.address)?;
            check_owner(&source.owner, authority)?;
            if source.mint != destination.mint {
                return Err(TokenError::MintMismatch.into());
            }
            if source.amount < amount {
                return Err(TokenError::InsufficientFunds {
                    required: amount,
                    available: source.amount,
                }
                .into());
            }
            if source_meta.address == destination_meta.address {
                return Ok(());
            }
            source.amount -= amount;
            destination.amount = destination
                .amount
                .checked_add(amount)
                .ok_or(TokenError::Overflow)?;
            store(ctx, source_meta.address, &source)?;
            store(ctx, destination_meta.address, &destination)
        }
        TokenInstruction::SetAuthority { new_authority } => {
            ctx.log("Instruction: SetAuthority");
            let [account_meta, authority, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let mut account: TokenAccount = load(ctx, &account_meta.address)?;
            check_owner(&account.owner, authority)?;
            account.owner = new_authority;
            store(ctx, account_meta.address, &account)
        }
        TokenInstruction::CloseAccount => {
            ctx.log("Instruction: CloseAccount");
            let [account_meta, destination, authority, ..] = accounts else {
                return Err(TokenError::InvalidInstruction.into());
            };
            let state: TokenAccount = load(ctx, &account_meta.address)?;
            check_owner(&state.owner, authority)?;
            if state.amount != 0 {
                return Err(TokenError::NonEmptyAccount(state.amount).into());
            }
            let mut account = ctx.account(&account_meta.address);
            let lamports = account.lamports;
            account.lamports = 0;
            account.data.iter_mut().for_each(|b| *b = 0);
            ctx.set_account(account_meta.address, account)?;

            let mut receiver = ctx.account(&destination.address);
            receiver.lamports = receiver
                .lamports
                .checked_add(lamports)
                .ok_or(TokenError::Overflow)?;
            ctx.set_account(destination.address, receiver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionError;
    use crate::runtime::{Ledger, LedgerError};
    use crate::signatures::{Keypair, Transaction};
    use crate::system;

    fn run(
        ledger: &mut Ledger,
        payer: &Keypair,
        signers: &[&Keypair],
        ixs: Vec<Instruction>,
    ) -> Result<(), TransactionError> {
        let mut tx = Transaction::new(payer.address(), ixs);
        let mut keys = vec![payer];
        keys.extend_from_slice(signers);
        tx.sign(&keys);
        match ledger.process_transaction(&tx) {
            Ok(_) => Ok(()),
            Err(LedgerError::Transaction(e)) => Err(e),
            Err(other) => panic!("{other}"),
        }
    }

    fn setup() -> (Ledger, Keypair) {
        let mut ledger: Ledger = Ledger::default();
        let payer = Keypair::new();
        ledger.airdrop(payer.address(), 100_000_000).unwrap();
        (ledger, payer)
    }

    fn new_mint(ledger: &mut Ledger, payer: &Keypair) -> Address {
        let mint = Keypair::new();
        let rent = ledger.rent().minimum_balance(Mint::LEN);
        run(
            ledger,
            payer,
            &[&mint],
            vec![
                system::create_account(payer.address(), mint.address(), rent, Mint::LEN as u64, TOKEN_PROGRAM_ID),
                initialize_mint(mint.address(), payer.address(), 0),
            ],
        )
        .unwrap();
        mint.address()
    }

    fn token_account(ledger: &mut Ledger, payer: &Keypair, mint: Address, owner: Address, amount: u64) -> Address {
        let account = Keypair::new();
        let rent = ledger.rent().minimum_balance(TokenAccount::LEN);
        run(
            ledger,
            payer,
            &[&account],
            vec![
                system::create_account(payer.address(), account.address(), rent, TokenAccount::LEN as u64, TOKEN_PROGRAM_ID),
                initialize_account(account.address(), mint, owner),
                mint_to(mint, account.address(), payer.address(), amount),
            ],
        )
        .unwrap();
        account.address()
    }

    fn balance(ledger: &Ledger, address: &Address) -> u64 {
        TokenAccount::unpack(&ledger.get_account(address).unwrap().data)
            .unwrap()
            .amount
    }

    #[test]
    fn mint_and_transfer() {
        let (mut ledger, payer) = setup();
        let mint = new_mint(&mut ledger, &payer);
        let alice = Keypair::new();
        let from = token_account(&mut ledger, &payer, mint, alice.address(), 50);
        let to = token_account(&mut ledger, &payer, mint, Address::new_unique(), 0);

        run(&mut ledger, &payer, &[&alice], vec![transfer(from, to, alice.address(), 20)]).unwrap();

        assert_eq!(balance(&ledger, &from), 30);
        assert_eq!(balance(&ledger, &to), 20);
        let mint = Mint::unpack(&ledger.get_account(&mint).unwrap().data).unwrap();
        assert_eq!(mint.supply, 50);
    }

    #[test]
    fn transfer_rejects_overdraft_and_wrong_owner() {
        let (mut ledger, payer) = setup();
        let mint = new_mint(&mut ledger, &payer);
        let alice = Keypair::new();
        let mallory = Keypair::new();
        let from = token_account(&mut ledger, &payer, mint, alice.address(), 10);
        let to = token_account(&mut ledger, &payer, mint, mallory.address(), 0);

        let err = run(&mut ledger, &payer, &[&alice], vec![transfer(from, to, alice.address(), 11)]).unwrap_err();
        assert_eq!(
            err.instruction_error(),
            Some(&InstructionError::Token(TokenError::InsufficientFunds {
                required: 11,
                available: 10
            }))
        );

        let err = run(&mut ledger, &payer, &[&mallory], vec![transfer(from, to, mallory.address(), 1)]).unwrap_err();
        assert_eq!(
            err.instruction_error(),
            Some(&InstructionError::Token(TokenError::OwnerMismatch))
        );
    }

    #[test]
    fn set_authority_moves_control() {
        let (mut ledger, payer) = setup();
        let mint = new_mint(&mut ledger, &payer);
        let alice = Keypair::new();
        let bob = Keypair::new();
        let account = token_account(&mut ledger, &payer, mint, alice.address(), 5);
        let sink = token_account(&mut ledger, &payer, mint, bob.address(), 0);

        run(&mut ledger, &payer, &[&alice], vec![set_authority(account, alice.address(), bob.address())]).unwrap();

        let err = run(&mut ledger, &payer, &[&alice], vec![transfer(account, sink, alice.address(), 1)]).unwrap_err();
        assert_eq!(
            err.instruction_error(),
            Some(&InstructionError::Token(TokenError::OwnerMismatch))
        );
        run(&mut ledger, &payer, &[&bob], vec![transfer(account, sink, bob.address(), 5)]).unwrap();
        assert_eq!(balance(&ledger, &sink), 5);
    }

    #[test]
    fn close_requires_empty_account_and_refunds_rent() {
        let (mut ledger, payer) = setup();
        let mint = new_mint(&mut ledger, &payer);
        let alice = Keypair::new();
        let account = token_account(&mut ledger, &payer, mint, alice.address(), 5);
        let sink = token_account(&mut ledger, &payer, mint, Address::new_unique(), 0);
        let rent = ledger.get_account(&account).unwrap().lamports;

        let err = run(&mut ledger, &payer, &[&alice], vec![close_account(account, alice.address(), alice.address())]).unwrap_err();
        assert_eq!(
            err.instruction_error(),
            Some(&InstructionError::Token(TokenError::NonEmptyAccount(5)))
        );

        run(
            &mut ledger,
            &payer,
            &[&alice],
            vec![
                transfer(account, sink, alice.address(), 5),
                close_account(account, alice.address(), alice.address()),
            ],
        )
        .unwrap();
        assert!(ledger.get_account(&account).is_none());
        assert_eq!(ledger.get_account(&alice.address()).unwrap().lamports, rent);
    }

    #[test]
    fn transfer_across_mints_is_rejected() {
        let (mut ledger, payer) = setup();
        let mint_x = new_mint(&mut ledger, &payer);
        let mint_y = new_mint(&mut ledger, &payer);
        let alice = Keypair::new();
        let from = token_account(&mut ledger, &payer, mint_x, alice.address(), 5);
        let to = token_account(&mut ledger, &payer, mint_y, alice.address(), 0);

        let err = run(&mut ledger, &payer, &[&alice], vec![transfer(from, to, alice.address(), 1)]).unwrap_err();
        assert_eq!(
            err.instruction_error(),
            Some(&InstructionError::Token(TokenError::MintMismatch))
        );
    }
}
