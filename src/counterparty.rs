//! The counterparty's side of a trade: settle an open escrow.

use crate::address::{Address, ESCROW_AUTHORITY_SEED};
use crate::client::LedgerClient;
use crate::config::{ClientConfig, Terms};
use crate::error::{FlowError, VerificationError};
use crate::initializer::{check_balance, fetch_record, send_options, token_balance};
use crate::instruction::{self, ExchangeKeys};
use crate::runtime::TransactionOutcome;
use crate::signatures::{Keypair, Transaction};

#[derive(Debug, Clone, Copy)]
pub struct ExchangeRequest {
    pub program_id: Address,
    pub escrow: Address,
    /// Counterparty's account it pays the initializer from.
    pub payment_account: Address,
    /// Counterparty's account receiving the deposit.
    pub receive_account: Address,
    pub terms: Terms,
}

/// What each side ended up with after a verified settlement.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub escrow: Address,
    pub initializer_received: u64,
    pub counterparty_received: u64,
    pub outcome: TransactionOutcome,
}

/// Settles the escrow at `request.escrow` and verifies both legs landed.
///
/// Refuses to pay unless the record asks for exactly
/// `terms.initializer_expected_amount`. The counterparty states it expects
/// `terms.counterparty_expected_amount` out of the temp account; the program
/// refuses the trade otherwise.
pub async fn take_escrow<C: LedgerClient>(
    client: &C,
    config: &ClientConfig,
    counterparty: &Keypair,
    request: ExchangeRequest,
) -> Result<Settlement, FlowError> {
    request.terms.validate()?;
    let record = fetch_record(client, &request.escrow).await?;
    if !record.is_initialized {
        return Err(VerificationError::NotInitialized.into());
    }
    let price = request.terms.initializer_expected_amount;
    if record.expected_amount != price {
        return Err(VerificationError::ExpectedAmountMismatch {
            expected: price,
            found: record.expected_amount,
        }
        .into());
    }
    let (pda, _) = client.derive_address(&[ESCROW_AUTHORITY_SEED], &request.program_id)?;

    let deposit = token_balance(client, &record.temp_holding_account).await?;
    let initializer_before = token_balance(client, &record.initializer_receive_account).await?;
    let receive_before = token_balance(client, &request.receive_account).await?;
    let payment_before = token_balance(client, &request.payment_account).await?;

    let keys = ExchangeKeys {
        counterparty: counterparty.address(),
        counterparty_payment_account: request.payment_account,
        counterparty_receive_account: request.receive_account,
        temp_token_account: record.temp_holding_account,
        initializer: record.initializer,
        initializer_receive_account: record.initializer_receive_account,
        escrow_account: request.escrow,
        pda,
    };
    let ix = instruction::exchange(
        request.program_id,
        keys,
        request.terms.counterparty_expected_amount,
    );
    let transaction = Transaction::new(counterparty.address(), vec![ix]);
    let outcome = client
        .submit(transaction, &[counterparty], send_options(config))
        .await?;

    tokio::time::sleep(config.settle_delay()).await;

    if client.get_account(&request.escrow).await?.is_some() {
        return Err(VerificationError::EscrowNotClosed(request.escrow).into());
    }
    if client.get_account(&record.temp_holding_account).await?.is_some() {
        return Err(VerificationError::TempNotClosed(record.temp_holding_account).into());
    }

    let initializer_after = token_balance(client, &record.initializer_receive_account).await?;
    check_balance(
        record.initializer_receive_account,
        initializer_before.saturating_add(price),
        initializer_after,
    )?;
    let receive_after = token_balance(client, &request.receive_account).await?;
    check_balance(
        request.receive_account,
        receive_before.saturating_add(deposit),
        receive_after,
    )?;
    let payment_after = token_balance(client, &request.payment_account).await?;
    check_balance(
        request.payment_account,
        payment_before.saturating_sub(price),
        payment_after,
    )?;

    Ok(Settlement {
        escrow: request.escrow,
        initializer_received: price,
        counterparty_received: deposit,
        outcome,
    })
}
