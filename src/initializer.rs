//! The initializer's side of a trade: open an escrow, or withdraw it again.

use crate::address::{Address, ESCROW_AUTHORITY_SEED, TOKEN_PROGRAM_ID};
use crate::client::{LedgerClient, SendOptions};
use crate::config::{ClientConfig, Terms};
use crate::error::{FlowError, VerificationError};
use crate::escrow::EscrowRecord;
use crate::instruction;
use crate::runtime::TransactionOutcome;
use crate::signatures::{Keypair, Transaction};
use crate::system;
use crate::token::{self, TokenAccount};

pub(crate) fn send_options(config: &ClientConfig) -> SendOptions {
    SendOptions {
        skip_preflight: config.skip_preflight,
        commitment: config.commitment,
    }
}

/// Reads and decodes the record at `escrow`.
pub async fn fetch_record<C: LedgerClient>(client: &C, escrow: &Address) -> Result<EscrowRecord, FlowError> {
    let account = client
        .get_account(escrow)
        .await?
        .ok_or(VerificationError::EscrowMissing(*escrow))?;
    EscrowRecord::decode(&account.data).map_err(|error| FlowError::Record {
        address: *escrow,
        error,
    })
}

pub(crate) async fn token_balance<C: LedgerClient>(client: &C, address: &Address) -> Result<u64, FlowError> {
    client
        .get_token_balance(address)
        .await?
        .ok_or_else(|| VerificationError::TokenAccountMissing(*address).into())
}

pub(crate) fn check_balance(account: Address, expected: u64, found: u64) -> Result<(), VerificationError> {
    if expected != found {
        return Err(VerificationError::BalanceMismatch {
            account,
            expected,
            found,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct InitializeRequest {
    pub program_id: Address,
    /// Initializer's account holding the asset it deposits.
    pub deposit_account: Address,
    /// Initializer's account for the asset it wants in return.
    pub receive_account: Address,
    pub terms: Terms,
}

#[derive(Debug, Clone)]
pub struct OpenedEscrow {
    pub escrow: Address,
    pub temp_token_account: Address,
    pub record: EscrowRecord,
    pub outcome: TransactionOutcome,
}

/// Opens an escrow in one transaction and checks the record it produced.
///
/// The transaction creates and funds the temp token account, allocates the
/// record account and runs `InitEscrow`. It deposits
/// `terms.counterparty_expected_amount` and asks for
/// `terms.initializer_expected_amount` in return.
pub async fn initialize_escrow<C: LedgerClient>(
    client: &C,
    config: &ClientConfig,
    initializer: &Keypair,
    request: InitializeRequest,
) -> Result<OpenedEscrow, FlowError> {
    request.terms.validate()?;
    let owner = initializer.address();
    let deposit = client
        .get_token_account(&request.deposit_account)
        .await?
        .ok_or(VerificationError::TokenAccountMissing(request.deposit_account))?;

    let temp = Keypair::new();
    let escrow = Keypair::new();
    let temp_rent = client
        .minimum_balance_for_rent_exemption(TokenAccount::LEN)
        .await;
    let escrow_rent = client
        .minimum_balance_for_rent_exemption(EscrowRecord::LEN)
        .await;

    let instructions = vec![
        system::create_account(
            owner,
            temp.address(),
            temp_rent,
            TokenAccount::LEN as u64,
            TOKEN_PROGRAM_ID,
        ),
        token::initialize_account(temp.address(), deposit.mint, owner),
        token::transfer(
            request.deposit_account,
            temp.address(),
            owner,
            request.terms.counterparty_expected_amount,
        ),
        system::create_account(
            owner,
            escrow.address(),
            escrow_rent,
            EscrowRecord::LEN as u64,
            request.program_id,
        ),
        instruction::init_escrow(
            request.program_id,
            owner,
            temp.address(),
            request.receive_account,
            escrow.address(),
            request.terms.initializer_expected_amount,
        ),
    ];
    let transaction = Transaction::new(owner, instructions);
    let outcome = client
        .submit(transaction, &[initializer, &temp, &escrow], send_options(config))
        .await?;

    tokio::time::sleep(config.settle_delay()).await;

    let record = fetch_record(client, &escrow.address()).await?;
    let expected = EscrowRecord::new(
        owner,
        temp.address(),
        request.receive_account,
        request.terms.initializer_expected_amount,
    );
    verify_opened(&record, &expected)?;

    let (pda, _) = client.derive_address(&[ESCROW_AUTHORITY_SEED], &request.program_id)?;
    let held = client
        .get_token_account(&temp.address())
        .await?
        .ok_or(VerificationError::TokenAccountMissing(temp.address()))?;
    if held.owner != pda {
        return Err(VerificationError::TempAuthorityMismatch {
            expected: pda,
            found: held.owner,
        }
        .into());
    }
    if held.amount != request.terms.counterparty_expected_amount {
        return Err(VerificationError::DepositMismatch {
            expected: request.terms.counterparty_expected_amount,
            found: held.amount,
        }
        .into());
    }

    Ok(OpenedEscrow {
        escrow: escrow.address(),
        temp_token_account: temp.address(),
        record,
        outcome,
    })
}

/// Compares a freshly read record with the one the flow meant to create.
pub fn verify_opened(found: &EscrowRecord, expected: &EscrowRecord) -> Result<(), VerificationError> {
    if !found.is_initialized {
        return Err(VerificationError::NotInitialized);
    }
    if found.initializer != expected.initializer {
        return Err(VerificationError::InitializerMismatch {
            expected: expected.initializer,
            found: found.initializer,
        });
    }
    if found.initializer_receive_account != expected.initializer_receive_account {
        return Err(VerificationError::ReceiveAccountMismatch {
            expected: expected.initializer_receive_account,
            found: found.initializer_receive_account,
        });
    }
    if found.temp_holding_account != expected.temp_holding_account {
        return Err(VerificationError::TempAccountMismatch {
            expected: expected.temp_holding_account,
            found: found.temp_holding_account,
        });
    }
    if found.expected_amount != expected.expected_amount {
        return Err(VerificationError::ExpectedAmountMismatch {
            expected: expected.expected_amount,
            found: found.expected_amount,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub escrow: Address,
    pub refunded: u64,
    pub outcome: TransactionOutcome,
}

/// Withdraws an open escrow, returning the deposit to `refund_account`.
pub async fn cancel_escrow<C: LedgerClient>(
    client: &C,
    config: &ClientConfig,
    initializer: &Keypair,
    program_id: Address,
    escrow: Address,
    refund_account: Address,
) -> Result<Cancellation, FlowError> {
    let record = fetch_record(client, &escrow).await?;
    let (pda, _) = client.derive_address(&[ESCROW_AUTHORITY_SEED], &program_id)?;

    let deposit = token_balance(client, &record.temp_holding_account).await?;
    let refund_before = token_balance(client, &refund_account).await?;

    let ix = instruction::cancel(
        program_id,
        initializer.address(),
        record.temp_holding_account,
        refund_account,
        escrow,
        pda,
    );
    let transaction = Transaction::new(initializer.address(), vec![ix]);
    let outcome = client
        .submit(transaction, &[initializer], send_options(config))
        .await?;

    tokio::time::sleep(config.settle_delay()).await;

    if client.get_account(&escrow).await?.is_some() {
        return Err(VerificationError::EscrowNotClosed(escrow).into());
    }
    if client.get_account(&record.temp_holding_account).await?.is_some() {
        return Err(VerificationError::TempNotClosed(record.temp_holding_account).into());
    }
    let refund_after = token_balance(client, &refund_account).await?;
    check_balance(refund_account, refund_before.saturating_add(deposit), refund_after)?;

    Ok(Cancellation {
        escrow,
        refunded: deposit,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EscrowRecord {
        EscrowRecord::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            100,
        )
    }

    #[test]
    fn verification_names_the_field_that_disagrees() {
        let expected = record();
        assert_eq!(verify_opened(&expected, &expected), Ok(()));

        let mut found = expected;
        found.is_initialized = false;
        assert_eq!(verify_opened(&found, &expected), Err(VerificationError::NotInitialized));

        let mut found = expected;
        found.initializer = Address::new_unique();
        assert!(matches!(
            verify_opened(&found, &expected),
            Err(VerificationError::InitializerMismatch { .. })
        ));

        let mut found = expected;
        found.initializer_receive_account = Address::new_unique();
        assert!(matches!(
            verify_opened(&found, &expected),
            Err(VerificationError::ReceiveAccountMismatch { .. })
        ));

        let mut found = expected;
        found.temp_holding_account = Address::new_unique();
        assert!(matches!(
            verify_opened(&found, &expected),
            Err(VerificationError::TempAccountMismatch { .. })
        ));

        let mut found = expected;
        found.expected_amount = 99;
        assert_eq!(
            verify_opened(&found, &expected),
            Err(VerificationError::ExpectedAmountMismatch {
                expected: 100,
                found: 99
            })
        );
    }

    #[test]
    fn balance_check() {
        let account = Address::new_unique();
        assert_eq!(check_balance(account, 5, 5), Ok(()));
        assert_eq!(
            check_balance(account, 5, 4),
            Err(VerificationError::BalanceMismatch {
                account,
                expected: 5,
                found: 4
            })
        );
    }
}
