//! Builds the local world the CLI trades in: a deployed escrow program, two
//! parties, two mints and a token account per party and mint.

use crate::address::{Address, TOKEN_PROGRAM_ID};
use crate::client::{ClientError, LedgerClient, LocalClient, SendOptions};
use crate::config::Terms;
use crate::error::FlowError;
use crate::instruction::Instruction;
use crate::keys::{KeyError, KeyStore};
use crate::signatures::{Keypair, Transaction};
use crate::storage::Storage;
use crate::system;
use crate::token::{self, Mint, TokenAccount};

pub const AIRDROP_LAMPORTS: u64 = 10_000_000_000;

/// Everything the flows need to find again, by role name.
#[derive(Debug, Clone)]
pub struct Environment {
    pub program_id: Address,
    pub alice: Keypair,
    pub bob: Keypair,
    pub mint_x: Address,
    pub mint_y: Address,
    pub alice_x: Address,
    pub alice_y: Address,
    pub bob_x: Address,
    pub bob_y: Address,
}

impl Environment {
    /// Registers every role under its well-known name.
    pub fn save(&self, keys: &KeyStore) -> Result<(), KeyError> {
        keys.write_keypair("alice", &self.alice)?;
        keys.write_keypair("bob", &self.bob)?;
        for (name, address) in [
            ("program", self.program_id),
            ("mint_x", self.mint_x),
            ("mint_y", self.mint_y),
            ("alice_x", self.alice_x),
            ("alice_y", self.alice_y),
            ("bob_x", self.bob_x),
            ("bob_y", self.bob_y),
        ] {
            keys.write_public_key(name, &address)?;
        }
        Ok(())
    }

    pub fn load(keys: &KeyStore) -> Result<Self, KeyError> {
        Ok(Self {
            program_id: keys.get_program_id()?,
            alice: keys.get_keypair("alice")?,
            bob: keys.get_keypair("bob")?,
            mint_x: keys.get_public_key("mint_x")?,
            mint_y: keys.get_public_key("mint_y")?,
            alice_x: keys.get_public_key("alice_x")?,
            alice_y: keys.get_public_key("alice_y")?,
            bob_x: keys.get_public_key("bob_x")?,
            bob_y: keys.get_public_key("bob_y")?,
        })
    }

    /// Labelled party accounts, in the order the CLI prints them.
    pub fn party_accounts(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("Alice Token Account X", self.alice_x),
            ("Alice Token Account Y", self.alice_y),
            ("Bob Token Account X", self.bob_x),
            ("Bob Token Account Y", self.bob_y),
        ]
    }
}

async fn create_mint<C: LedgerClient>(client: &C, payer: &Keypair) -> Result<Address, FlowError> {
    let mint = Keypair::new();
    let rent = client.minimum_balance_for_rent_exemption(Mint::LEN).await;
    let transaction = Transaction::new(
        payer.address(),
        vec![
            system::create_account(
                payer.address(),
                mint.address(),
                rent,
                Mint::LEN as u64,
                TOKEN_PROGRAM_ID,
            ),
            token::initialize_mint(mint.address(), payer.address(), 0),
        ],
    );
    client
        .submit(transaction, &[payer, &mint], SendOptions::default())
        .await?;
    Ok(mint.address())
}

fn token_account_instructions(rent: u64, payer: &Address, account: &Address, mint: &Address) -> Vec<Instruction> {
    vec![
        system::create_account(*payer, *account, rent, TokenAccount::LEN as u64, TOKEN_PROGRAM_ID),
        token::initialize_account(*account, *mint, *payer),
    ]
}

/// Opens one account per mint for `owner` and fills the one for `funded_mint`.
/// `owner` must be that mint's authority.
async fn open_party_accounts<C: LedgerClient>(
    client: &C,
    owner: &Keypair,
    mints: [Address; 2],
    funded_mint: Address,
    amount: u64,
) -> Result<[Address; 2], FlowError> {
    let rent = client
        .minimum_balance_for_rent_exemption(TokenAccount::LEN)
        .await;
    let accounts = [Keypair::new(), Keypair::new()];
    let mut instructions = Vec::new();
    for (account, mint) in accounts.iter().zip(mints) {
        instructions.extend(token_account_instructions(
            rent,
            &owner.address(),
            &account.address(),
            &mint,
        ));
        if mint == funded_mint {
            instructions.push(token::mint_to(mint, account.address(), owner.address(), amount));
        }
    }
    let transaction = Transaction::new(owner.address(), instructions);
    client
        .submit(
            transaction,
            &[owner, &accounts[0], &accounts[1]],
            SendOptions::default(),
        )
        .await?;
    Ok([accounts[0].address(), accounts[1].address()])
}

/// Sets up a fresh environment on `client`'s ledger.
///
/// Alice ends up holding `terms.counterparty_expected_amount` of X and Bob
/// `terms.initializer_expected_amount` of Y, exactly what the trade needs.
pub async fn bootstrap<S: Storage>(client: &LocalClient<S>, terms: &Terms) -> Result<Environment, FlowError> {
    terms.validate()?;
    let program_id = Keypair::new().address();
    client
        .ledger()
        .await
        .deploy_escrow_program(program_id)
        .map_err(ClientError::from)?;

    let alice = Keypair::new();
    let bob = Keypair::new();
    client.airdrop(&alice.address(), AIRDROP_LAMPORTS).await?;
    client.airdrop(&bob.address(), AIRDROP_LAMPORTS).await?;

    let mint_x = create_mint(client, &alice).await?;
    let mint_y = create_mint(client, &bob).await?;

    let [alice_x, alice_y] = open_party_accounts(
        client,
        &alice,
        [mint_x, mint_y],
        mint_x,
        terms.counterparty_expected_amount,
    )
    .await?;
    let [bob_x, bob_y] = open_party_accounts(
        client,
        &bob,
        [mint_x, mint_y],
        mint_y,
        terms.initializer_expected_amount,
    )
    .await?;

    Ok(Environment {
        program_id,
        alice,
        bob,
        mint_x,
        mint_y,
        alice_x,
        alice_y,
        bob_x,
        bob_y,
    })
}
