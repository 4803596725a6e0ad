use escrow_swap::bootstrap::Environment;
use escrow_swap::config::{ClientConfig, Settings, Terms};
use escrow_swap::initializer::{initialize_escrow, InitializeRequest};
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
    let client = LocalClient::new(Ledger::new(FileStorage::open(settings.ledger_path())?));

    println!("Sending Alice's transaction...");
    let request = InitializeRequest {
        program_id: env.program_id,
        deposit_account: env.alice_x,
        receive_account: env.alice_y,
        terms,
    };
    let opened = initialize_escrow(&client, &config, &env.alice, request).await?;
    keys.write_public_key("escrow", &opened.escrow)?;

    println!(
        "✨Escrow successfully initialized. Alice is offering {}X for {}Y✨\n",
        terms.counterparty_expected_amount, terms.initializer_expected_amount
    );
    for line in &opened.outcome.logs {
        println!("  {line}");
    }
    println!();

    let mut accounts = env.party_accounts();
    accounts.push(("Temporary Token Account X", opened.temp_token_account));
    let rows = collect_balances(&client, &accounts).await?;
    print!("{}", balance_table(&rows));
    Ok(())
}
