use std::fmt::Write as _;

use crate::address::Address;
use crate::client::{ClientError, LedgerClient};
use crate::runtime::InvokeContext;

// Helper for consistent logging
pub fn log_escrow_event(
    ctx: &mut InvokeContext<'_>,
    event: &str,
    escrow: &Address,
    actor: &Address,
    amount: u64,
) {
    ctx.log(format!(
        "ESCROW_{}: escrow='{}', actor='{}', amount='{}'",
        event, escrow, actor, amount
    ));
}

/// Renders labelled balances as a two-column table.
pub fn balance_table(rows: &[(String, Option<u64>)]) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, balance) in rows {
        let shown = balance.map_or_else(|| "closed".to_string(), |b| b.to_string());
        let _ = writeln!(out, "| {:<width$} | {:>12} |", label, shown, width = width);
    }
    out
}

/// Reads the token balance of every labelled account; closed ones read as `None`.
pub async fn collect_balances<C: LedgerClient>(
    client: &C,
    accounts: &[(&str, Address)],
) -> Result<Vec<(String, Option<u64>)>, ClientError> {
    let mut rows = Vec::with_capacity(accounts.len());
    for (label, address) in accounts {
        rows.push((label.to_string(), client.get_token_balance(address).await?));
    }
    Ok(rows)
}
