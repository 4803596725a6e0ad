//! The escrow state machine.
//!
//! `Uninitialized → Initialized` through [`EscrowInstruction::InitEscrow`];
//! `Initialized → Closed` through [`EscrowInstruction::Exchange`] or
//! [`EscrowInstruction::Cancel`]. A closed record no longer exists, so it can
//! never be settled twice.

use crate::address::{Address, Authority, ESCROW_AUTHORITY_SEED, SYSVAR_RENT_ID, TOKEN_PROGRAM_ID};
use crate::error::{EscrowError, InstructionError};
use crate::escrow::{EscrowRecord, EscrowState};
use crate::instruction::{AccountMeta, EscrowInstruction};
use crate::runtime::InvokeContext;
use crate::storage::Account;
use crate::token::{self, Pack, TokenAccount};
use crate::utils::log_escrow_event;

pub(crate) fn process(
    ctx: &mut InvokeContext<'_>,
    program_id: &Address,
    accounts: &[AccountMeta],
    instruction_data: &[u8],
) -> Result<(), InstructionError> {
    match EscrowInstruction::unpack(instruction_data)? {
        EscrowInstruction::InitEscrow { amount } => {
            ctx.log("Instruction: InitEscrow");
            let accounts = InitEscrowAccounts::try_from(accounts)?;
            process_init_escrow(ctx, program_id, accounts, amount)
        }
        EscrowInstruction::Exchange { amount } => {
            ctx.log("Instruction: Exchange");
            let accounts = ExchangeAccounts::try_from(accounts)?;
            process_exchange(ctx, program_id, accounts, amount)
        }
        EscrowInstruction::Cancel => {
            ctx.log("Instruction: Cancel");
            let accounts = CancelAccounts::try_from(accounts)?;
            process_cancel(ctx, program_id, accounts)
        }
    }
}

fn check_signer(account: &AccountMeta) -> Result<(), EscrowError> {
    if !account.is_signer {
        return Err(EscrowError::Unauthorized);
    }
    Ok(())
}

fn check_token_program(account: &AccountMeta) -> Result<(), EscrowError> {
    if account.address != TOKEN_PROGRAM_ID {
        return Err(EscrowError::IncorrectProgramId);
    }
    Ok(())
}

pub struct InitEscrowAccounts<'a> {
    pub initializer: &'a AccountMeta,
    pub temp_token_account: &'a AccountMeta,
    pub receive_account: &'a AccountMeta,
    pub escrow: &'a AccountMeta,
}

impl<'a> TryFrom<&'a [AccountMeta]> for InitEscrowAccounts<'a> {
    type Error = EscrowError;

    fn try_from(accounts: &'a [AccountMeta]) -> Result<Self, Self::Error> {
        let [initializer, temp_token_account, receive_account, escrow, rent, token_program, ..] =
            accounts
        else {
            return Err(EscrowError::NotEnoughAccountKeys);
        };

        check_signer(initializer)?;
        check_token_program(token_program)?;
        if rent.address != SYSVAR_RENT_ID {
            return Err(EscrowError::IncorrectProgramId);
        }

        Ok(Self {
            initializer,
            temp_token_account,
            receive_account,
            escrow,
        })
    }
}

pub struct ExchangeAccounts<'a> {
    pub counterparty: &'a AccountMeta,
    pub payment_account: &'a AccountMeta,
    pub receive_account: &'a AccountMeta,
    pub temp_token_account: &'a AccountMeta,
    pub initializer: &'a AccountMeta,
    pub initializer_receive_account: &'a AccountMeta,
    pub escrow: &'a AccountMeta,
    pub pda: &'a AccountMeta,
}

impl<'a> TryFrom<&'a [AccountMeta]> for ExchangeAccounts<'a> {
    type Error = EscrowError;

    fn try_from(accounts: &'a [AccountMeta]) -> Result<Self, Self::Error> {
        let [
            counterparty,
            payment_account,
            receive_account,
            temp_token_account,
            initializer,
            initializer_receive_account,
            escrow,
            token_program,
            pda,
            ..,
        ] = accounts
        else {
            return Err(EscrowError::NotEnoughAccountKeys);
        };

        check_signer(counterparty)?;
        check_token_program(token_program)?;

        Ok(Self {
            counterparty,
            payment_account,
            receive_account,
            temp_token_account,
            initializer,
            initializer_receive_account,
            escrow,
            pda,
        })
    }
}

pub struct CancelAccounts<'a> {
    pub initializer: &'a AccountMeta,
    pub temp_token_account: &'a AccountMeta,
    pub refund_account: &'a AccountMeta,
    pub escrow: &'a AccountMeta,
    pub pda: &'a AccountMeta,
}

impl<'a> TryFrom<&'a [AccountMeta]> for CancelAccounts<'a> {
    type Error = EscrowError;

    fn try_from(accounts: &'a [AccountMeta]) -> Result<Self, Self::Error> {
        let [initializer, temp_token_account, refund_account, escrow, token_program, pda, ..] = accounts
        else {
            return Err(EscrowError::NotEnoughAccountKeys);
        };

        check_signer(initializer)?;
        check_token_program(token_program)?;

        Ok(Self {
            initializer,
            temp_token_account,
            refund_account,
            escrow,
            pda,
        })
    }
}

fn load_token_account(ctx: &InvokeContext<'_>, address: &Address) -> Result<TokenAccount, InstructionError> {
    let account = ctx.account(address);
    if account.owner != TOKEN_PROGRAM_ID {
        return Err(EscrowError::IncorrectProgramId.into());
    }
    Ok(TokenAccount::unpack(&account.data)?)
}

/// Loads an open record, checking it belongs to this program.
fn load_open_record(
    ctx: &InvokeContext<'_>,
    program_id: &Address,
    escrow: &Address,
) -> Result<(Account, EscrowRecord), EscrowError> {
    let account = ctx.account(escrow);
    if account.exists() && &account.owner != program_id {
        return Err(EscrowError::InvalidAccountOwner);
    }
    let data = account.exists().then_some(account.data.as_slice());
    match EscrowRecord::state_of(data)? {
        EscrowState::Initialized => {
            let record = EscrowRecord::decode(&account.data)?;
            Ok((account, record))
        }
        EscrowState::Uninitialized | EscrowState::Closed => Err(EscrowError::RecordNotInitialized),
    }
}

/// Re-derives the program's authority and checks the caller passed that address.
fn verify_authority(program_id: &Address, claimed: &Address) -> Result<u8, EscrowError> {
    Authority::escrow(*program_id)
        .verify(claimed)?
        .ok_or(EscrowError::InvalidAuthority)
}

/// Zeroes the record and hands its rent to `destination`; the runtime drops it at commit.
fn close_record(
    ctx: &mut InvokeContext<'_>,
    mut account: Account,
    escrow: Address,
    destination: Address,
) -> Result<(), InstructionError> {
    let lamports = account.lamports;
    account.data.iter_mut().for_each(|b| *b = 0);
    ctx.set_account(escrow, account)?;
    ctx.transfer_lamports(escrow, destination, lamports)
}

fn process_init_escrow(
    ctx: &mut InvokeContext<'_>,
    program_id: &Address,
    accounts: InitEscrowAccounts<'_>,
    amount: u64,
) -> Result<(), InstructionError> {
    let initializer = accounts.initializer.address;
    let temp_address = accounts.temp_token_account.address;
    let escrow_address = accounts.escrow.address;

    load_token_account(ctx, &accounts.receive_account.address)?;

    let mut escrow_account = ctx.account(&escrow_address);
    if &escrow_account.owner != program_id {
        return Err(EscrowError::InvalidAccountOwner.into());
    }
    if escrow_account.data.len() != EscrowRecord::LEN {
        return Err(EscrowError::StorageSizeMismatch {
            expected: EscrowRecord::LEN,
            actual: escrow_account.data.len(),
        }
        .into());
    }
    if !ctx
        .rent()
        .is_exempt(escrow_account.lamports, escrow_account.data.len())
    {
        return Err(EscrowError::NotRentExempt.into());
    }
    if EscrowRecord::decode(&escrow_account.data)?.is_initialized {
        return Err(EscrowError::AlreadyInitialized.into());
    }

    let temp = load_token_account(ctx, &temp_address)?;
    if temp.owner != initializer {
        return Err(EscrowError::Unauthorized.into());
    }
    if temp.amount == 0 {
        return Err(EscrowError::EmptyDeposit.into());
    }

    let record = EscrowRecord::new(
        initializer,
        temp_address,
        accounts.receive_account.address,
        amount,
    );
    escrow_account.data = record.encode().to_vec();
    ctx.set_account(escrow_address, escrow_account)?;

    // Custody of the deposit moves to the keyless program authority.
    let pda = Authority::escrow(*program_id).address()?;
    ctx.invoke(&token::set_authority(temp_address, initializer, pda))?;

    log_escrow_event(ctx, "INITIALIZED", &escrow_address, &initializer, amount);
    Ok(())
}

fn process_exchange(
    ctx: &mut InvokeContext<'_>,
    program_id: &Address,
    accounts: ExchangeAccounts<'_>,
    amount_expected_by_taker: u64,
) -> Result<(), InstructionError> {
    let escrow_address = accounts.escrow.address;
    let (escrow_account, record) = load_open_record(ctx, program_id, &escrow_address)?;

    // Addresses come from the record, never from the caller.
    for (recorded, passed) in [
        (record.temp_holding_account, accounts.temp_token_account),
        (record.initializer_receive_account, accounts.initializer_receive_account),
        (record.initializer, accounts.initializer),
    ] {
        if recorded != passed.address {
            return Err(EscrowError::AccountMismatch(passed.address).into());
        }
    }
    let bump = verify_authority(program_id, &accounts.pda.address)?;

    let temp = load_token_account(ctx, &record.temp_holding_account)?;
    if temp.amount != amount_expected_by_taker {
        return Err(EscrowError::AmountMismatch {
            expected: amount_expected_by_taker,
            actual: temp.amount,
        }
        .into());
    }
    let payment = load_token_account(ctx, &accounts.payment_account.address)?;
    if payment.amount < record.expected_amount {
        return Err(EscrowError::InsufficientBalance {
            required: record.expected_amount,
            available: payment.amount,
        }
        .into());
    }

    let counterparty = accounts.counterparty.address;
    ctx.invoke(&token::transfer(
        accounts.payment_account.address,
        record.initializer_receive_account,
        counterparty,
        record.expected_amount,
    ))?;

    let pda = accounts.pda.address;
    let bump_seed = [bump];
    let signer_seeds: &[&[u8]] = &[ESCROW_AUTHORITY_SEED, &bump_seed];
    ctx.invoke_signed(
        &token::transfer(
            record.temp_holding_account,
            accounts.receive_account.address,
            pda,
            temp.amount,
        ),
        &[signer_seeds],
    )?;
    ctx.invoke_signed(
        &token::close_account(record.temp_holding_account, record.initializer, pda),
        &[signer_seeds],
    )?;

    close_record(ctx, escrow_account, escrow_address, record.initializer)?;

    log_escrow_event(ctx, "EXCHANGED", &escrow_address, &counterparty, temp.amount);
    Ok(())
}

fn process_cancel(
    ctx: &mut InvokeContext<'_>,
    program_id: &Address,
    accounts: CancelAccounts<'_>,
) -> Result<(), InstructionError> {
    let escrow_address = accounts.escrow.address;
    let (escrow_account, record) = load_open_record(ctx, program_id, &escrow_address)?;

    if record.initializer != accounts.initializer.address {
        return Err(EscrowError::Unauthorized.into());
    }
    if record.temp_holding_account != accounts.temp_token_account.address {
        return Err(EscrowError::AccountMismatch(accounts.temp_token_account.address).into());
    }
    let bump = verify_authority(program_id, &accounts.pda.address)?;
    let temp = load_token_account(ctx, &record.temp_holding_account)?;

    let pda = accounts.pda.address;
    let bump_seed = [bump];
    let signer_seeds: &[&[u8]] = &[ESCROW_AUTHORITY_SEED, &bump_seed];
    if temp.amount > 0 {
        ctx.invoke_signed(
            &token::transfer(
                record.temp_holding_account,
                accounts.refund_account.address,
                pda,
                temp.amount,
            ),
            &[signer_seeds],
        )?;
    }
    ctx.invoke_signed(
        &token::close_account(record.temp_holding_account, record.initializer, pda),
        &[signer_seeds],
    )?;

    close_record(ctx, escrow_account, escrow_address, record.initializer)?;

    log_escrow_event(ctx, "CANCELLED", &escrow_address, &record.initializer, temp.amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionError;
    use crate::instruction::{self, ExchangeKeys, Instruction};
    use crate::runtime::{Ledger, LedgerError};
    use crate::signatures::{Keypair, Transaction};
    use crate::system;
    use crate::token::Mint;

    struct World {
        ledger: Ledger,
        program_id: Address,
        payer: Keypair,
        alice: Keypair,
        bob: Keypair,
        mint_x: Address,
        mint_y: Address,
        alice_x: Address,
        alice_y: Address,
        bob_x: Address,
        bob_y: Address,
    }

    struct Opened {
        temp: Address,
        escrow: Address,
    }

    fn run(ledger: &mut Ledger, payer: &Keypair, signers: &[&Keypair], ixs: Vec<Instruction>) -> Result<(), TransactionError> {
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

    fn escrow_error(result: Result<(), TransactionError>) -> EscrowError {
        result
            .unwrap_err()
            .escrow_error()
            .cloned()
            .expect("escrow program error")
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
                token::initialize_mint(mint.address(), payer.address(), 0),
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
                token::initialize_account(account.address(), mint, owner),
                token::mint_to(mint, account.address(), payer.address(), amount),
            ],
        )
        .unwrap();
        account.address()
    }

    fn setup() -> World {
        let mut ledger: Ledger = Ledger::default();
        let program_id = Address::new_unique();
        ledger.deploy_escrow_program(program_id).unwrap();
        let payer = Keypair::new();
        let alice = Keypair::new();
        let bob = Keypair::new();
        for key in [&payer, &alice, &bob] {
            ledger.airdrop(key.address(), 1_000_000_000).unwrap();
        }
        let mint_x = new_mint(&mut ledger, &payer);
        let mint_y = new_mint(&mut ledger, &payer);
        let alice_x = token_account(&mut ledger, &payer, mint_x, alice.address(), 50);
        let alice_y = token_account(&mut ledger, &payer, mint_y, alice.address(), 0);
        let bob_x = token_account(&mut ledger, &payer, mint_x, bob.address(), 0);
        let bob_y = token_account(&mut ledger, &payer, mint_y, bob.address(), 100);
        World {
            ledger,
            program_id,
            payer,
            alice,
            bob,
            mint_x,
            mint_y,
            alice_x,
            alice_y,
            bob_x,
            bob_y,
        }
    }

    impl World {
        fn balance(&self, address: &Address) -> Option<u64> {
            self.ledger
                .get_account(address)
                .map(|a| TokenAccount::unpack(&a.data).unwrap().amount)
        }

        fn pda(&self) -> Address {
            Authority::escrow(self.program_id).address().unwrap()
        }

        fn open_with(&mut self, deposit: u64, expected: u64, escrow_space: usize) -> (Opened, Result<(), TransactionError>) {
            let temp = Keypair::new();
            let escrow = Keypair::new();
            let alice = self.alice.address();
            let temp_rent = self.ledger.rent().minimum_balance(TokenAccount::LEN);
            let escrow_rent = self.ledger.rent().minimum_balance(escrow_space);
            let ixs = vec![
                system::create_account(alice, temp.address(), temp_rent, TokenAccount::LEN as u64, TOKEN_PROGRAM_ID),
                token::initialize_account(temp.address(), self.mint_x, alice),
                token::transfer(self.alice_x, temp.address(), alice, deposit),
                system::create_account(alice, escrow.address(), escrow_rent, escrow_space as u64, self.program_id),
                instruction::init_escrow(self.program_id, alice, temp.address(), self.alice_y, escrow.address(), expected),
            ];
            let result = run(&mut self.ledger, &self.alice, &[&temp, &escrow], ixs);
            let opened = Opened {
                temp: temp.address(),
                escrow: escrow.address(),
            };
            (opened, result)
        }

        fn open(&mut self) -> Opened {
            let (opened, result) = self.open_with(50, 100, EscrowRecord::LEN);
            result.unwrap();
            opened
        }

        fn exchange_keys(&self, opened: &Opened) -> ExchangeKeys {
            ExchangeKeys {
                counterparty: self.bob.address(),
                counterparty_payment_account: self.bob_y,
                counterparty_receive_account: self.bob_x,
                temp_token_account: opened.temp,
                initializer: self.alice.address(),
                initializer_receive_account: self.alice_y,
                escrow_account: opened.escrow,
                pda: self.pda(),
            }
        }

        fn exchange(&mut self, keys: ExchangeKeys, amount: u64) -> Result<(), TransactionError> {
            let ix = instruction::exchange(self.program_id, keys, amount);
            run(&mut self.ledger, &self.bob, &[], vec![ix])
        }

        fn cancel(&mut self, signer: &Keypair, opened: &Opened) -> Result<(), TransactionError> {
            let ix = instruction::cancel(
                self.program_id,
                signer.address(),
                opened.temp,
                self.alice_x,
                opened.escrow,
                self.pda(),
            );
            run(&mut self.ledger, signer, &[], vec![ix])
        }
    }

    #[test]
    fn init_records_terms_and_hands_custody_to_pda() {
        let mut world = setup();
        let opened = world.open();

        let data = world.ledger.get_account(&opened.escrow).unwrap().data;
        let record = EscrowRecord::decode(&data).unwrap();
        assert_eq!(
            record,
            EscrowRecord::new(world.alice.address(), opened.temp, world.alice_y, 100)
        );

        let temp = TokenAccount::unpack(&world.ledger.get_account(&opened.temp).unwrap().data).unwrap();
        assert_eq!(temp.owner, world.pda());
        assert_eq!(temp.amount, 50);
        assert_eq!(world.balance(&world.alice_x), Some(0));
    }

    #[test]
    fn init_rejects_empty_deposit() {
        let mut world = setup();
        let (_, result) = world.open_with(0, 100, EscrowRecord::LEN);
        assert_eq!(escrow_error(result), EscrowError::EmptyDeposit);
    }

    #[test]
    fn init_rejects_wrong_record_size() {
        let mut world = setup();
        let (_, result) = world.open_with(50, 100, EscrowRecord::LEN + 1);
        assert_eq!(
            escrow_error(result),
            EscrowError::StorageSizeMismatch {
                expected: EscrowRecord::LEN,
                actual: EscrowRecord::LEN + 1,
            }
        );
        // Nothing from the failed transaction survives.
        assert_eq!(world.balance(&world.alice_x), Some(50));
    }

    #[test]
    fn init_twice_is_rejected() {
        let mut world = setup();
        let opened = world.open();
        let ix = instruction::init_escrow(
            world.program_id,
            world.alice.address(),
            opened.temp,
            world.alice_y,
            opened.escrow,
            100,
        );
        let alice = world.alice.clone();
        let result = run(&mut world.ledger, &alice, &[], vec![ix]);
        assert_eq!(escrow_error(result), EscrowError::AlreadyInitialized);
    }

    #[test]
    fn init_rejects_escrow_account_owned_elsewhere() {
        let mut world = setup();
        let escrow = Keypair::new();
        let alice = world.alice.address();
        let rent = world.ledger.rent().minimum_balance(EscrowRecord::LEN);
        let ixs = vec![
            system::create_account(alice, escrow.address(), rent, EscrowRecord::LEN as u64, Address::new_unique()),
            instruction::init_escrow(world.program_id, alice, world.alice_x, world.alice_y, escrow.address(), 100),
        ];
        let signer = world.alice.clone();
        let result = run(&mut world.ledger, &signer, &[&escrow], ixs);
        assert_eq!(escrow_error(result), EscrowError::InvalidAccountOwner);
    }

    #[test]
    fn init_rejects_uninitialized_receive_account() {
        let mut world = setup();
        let blank = Keypair::new();
        let alice = world.alice.address();
        let rent = world.ledger.rent().minimum_balance(TokenAccount::LEN);
        let escrow = Keypair::new();
        let escrow_rent = world.ledger.rent().minimum_balance(EscrowRecord::LEN);
        let ixs = vec![
            system::create_account(alice, blank.address(), rent, TokenAccount::LEN as u64, TOKEN_PROGRAM_ID),
            system::create_account(alice, escrow.address(), escrow_rent, EscrowRecord::LEN as u64, world.program_id),
            instruction::init_escrow(world.program_id, alice, world.alice_x, blank.address(), escrow.address(), 100),
        ];
        let signer = world.alice.clone();
        let err = run(&mut world.ledger, &signer, &[&blank, &escrow], ixs).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::InstructionError {
                error: InstructionError::Token(crate::error::TokenError::UninitializedState),
                ..
            }
        ));
        assert!(world.ledger.get_account(&escrow.address()).is_none());
    }

    #[test]
    fn exchange_against_blank_record_is_rejected() {
        let mut world = setup();
        let opened = world.open();
        let blank = Keypair::new();
        let bob = world.bob.address();
        let rent = world.ledger.rent().minimum_balance(EscrowRecord::LEN);
        let signer = world.bob.clone();
        run(
            &mut world.ledger,
            &signer,
            &[&blank],
            vec![system::create_account(bob, blank.address(), rent, EscrowRecord::LEN as u64, world.program_id)],
        )
        .unwrap();

        let mut keys = world.exchange_keys(&opened);
        keys.escrow_account = blank.address();
        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::RecordNotInitialized
        );
        assert_eq!(world.balance(&opened.temp), Some(50));
    }

    #[test]
    fn exchange_settles_both_legs_and_closes_accounts() {
        let mut world = setup();
        let opened = world.open();
        let alice_lamports = world.ledger.get_account(&world.alice.address()).unwrap().lamports;
        let reclaimed = world.ledger.get_account(&opened.temp).unwrap().lamports
            + world.ledger.get_account(&opened.escrow).unwrap().lamports;

        let keys = world.exchange_keys(&opened);
        world.exchange(keys, 50).unwrap();

        assert_eq!(world.balance(&world.alice_y), Some(100));
        assert_eq!(world.balance(&world.bob_x), Some(50));
        assert_eq!(world.balance(&world.bob_y), Some(0));
        assert!(world.ledger.get_account(&opened.temp).is_none());
        assert!(world.ledger.get_account(&opened.escrow).is_none());
        assert_eq!(
            world.ledger.get_account(&world.alice.address()).unwrap().lamports,
            alice_lamports + reclaimed
        );
    }

    #[test]
    fn exchange_with_mismatched_amount_fails() {
        let mut world = setup();
        let opened = world.open();
        let keys = world.exchange_keys(&opened);
        assert_eq!(
            escrow_error(world.exchange(keys, 30)),
            EscrowError::AmountMismatch {
                expected: 30,
                actual: 50
            }
        );
        assert_eq!(world.balance(&opened.temp), Some(50));
        assert_eq!(world.balance(&world.bob_y), Some(100));
    }

    #[test]
    fn exchange_rejects_forged_authority() {
        let mut world = setup();
        let opened = world.open();
        let mut keys = world.exchange_keys(&opened);
        keys.pda = world.bob.address();
        assert_eq!(escrow_error(world.exchange(keys, 50)), EscrowError::InvalidAuthority);
    }

    #[test]
    fn exchange_rejects_substituted_accounts() {
        let mut world = setup();
        let opened = world.open();

        let mut keys = world.exchange_keys(&opened);
        keys.initializer_receive_account = world.bob_y;
        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::AccountMismatch(world.bob_y)
        );

        let mut keys = world.exchange_keys(&opened);
        keys.temp_token_account = world.alice_x;
        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::AccountMismatch(world.alice_x)
        );
    }

    #[test]
    fn exchange_requires_enough_payment() {
        let mut world = setup();
        let opened = world.open();
        let payer = world.payer.clone();
        let short = token_account(&mut world.ledger, &payer, world.mint_y, world.bob.address(), 10);

        let mut keys = world.exchange_keys(&opened);
        keys.counterparty_payment_account = short;
        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::InsufficientBalance {
                required: 100,
                available: 10
            }
        );
    }

    #[test]
    fn exchange_without_counterparty_signature_is_unauthorized() {
        let mut world = setup();
        let opened = world.open();
        let keys = world.exchange_keys(&opened);
        let mut ix = instruction::exchange(world.program_id, keys, 50);
        ix.accounts[0].is_signer = false;
        let payer = world.payer.clone();
        let result = run(&mut world.ledger, &payer, &[], vec![ix]);
        assert_eq!(escrow_error(result), EscrowError::Unauthorized);
    }

    #[test]
    fn second_exchange_finds_no_record() {
        let mut world = setup();
        let opened = world.open();
        let keys = world.exchange_keys(&opened);
        world.exchange(keys, 50).unwrap();

        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::RecordNotInitialized
        );
    }

    #[test]
    fn cancel_refunds_initializer() {
        let mut world = setup();
        let opened = world.open();
        let alice = world.alice.clone();

        world.cancel(&alice, &opened).unwrap();

        assert_eq!(world.balance(&world.alice_x), Some(50));
        assert!(world.ledger.get_account(&opened.temp).is_none());
        assert!(world.ledger.get_account(&opened.escrow).is_none());

        let keys = world.exchange_keys(&opened);
        assert_eq!(
            escrow_error(world.exchange(keys, 50)),
            EscrowError::RecordNotInitialized
        );
    }

    #[test]
    fn only_initializer_may_cancel() {
        let mut world = setup();
        let opened = world.open();
        let bob = world.bob.clone();
        assert_eq!(
            escrow_error(world.cancel(&bob, &opened)),
            EscrowError::Unauthorized
        );
        assert_eq!(world.balance(&opened.temp), Some(50));
    }

    #[test]
    fn exchange_with_wrong_mint_receive_account_rolls_back() {
        let mut world = setup();
        let opened = world.open();
        let mut keys = world.exchange_keys(&opened);
        keys.counterparty_receive_account = world.bob_y;
        let err = world.exchange(keys, 50).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::InstructionError {
                error: InstructionError::Token(crate::error::TokenError::MintMismatch),
                ..
            }
        ));
        assert_eq!(world.balance(&world.bob_y), Some(100));
        assert_eq!(world.balance(&world.alice_y), Some(0));
        assert_eq!(world.balance(&opened.temp), Some(50));
    }
}
