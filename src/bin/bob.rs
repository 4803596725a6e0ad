use escrow_swap::bootstrap::Environment;
use escrow_swap::config::{ClientConfig, Settings, Terms};
use escrow_swap::counterparty::{take_escrow, ExchangeRequest};
use escrow_swap::keys::KeyStore;
use escrow_swap::storage::FileStorage;
use escrow_swap::utils::{balance_table, collect_balances};
use escrow_swap::{Ledger, LocalClient};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let terms = Terms::load(settings.terms_path())?;
    let config = ClientConfig::load_or_default(settings.client_config_path())?;
    let keys = KeyStore::new(settings.keys_dir());
    let env = Environment::load(&keys)?;
    let escrow = keys.get_public_key("escrow")?;
    let client = LocalClient::new(Ledger::new(FileStorage::open(settings.ledger_path())?));

    println!("Sending Bob's transaction...");
    let request = ExchangeRequest {
        program_id: env.program_id,
        escrow,
        payment_account: env.bob_y,
        receive_account: env.bob_x,
        terms,
    };
    let settlement = take_escrow(&client, &config, &env.bob, request).await?;

    println!("✨Trade successfully executed. All temporary accounts closed✨\n");
    for line in &settlement.outcome.logs {
        println!("  {line}");
    }
    println!();

    let rows = collect_balances(&client, &env.party_accounts()).await?;
    print!("{}", balance_table(&rows));
    Ok(())
}
