use escrow_swap::bootstrap::Environment;
use escrow_swap::config::{ClientConfig, Settings};
use escrow_swap::initializer::cancel_escrow;
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
    let config = ClientConfig::load_or_default(settings.client_config_path())?;
    let keys = KeyStore::new(settings.keys_dir());
    let env = Environment::load(&keys)?;
    let escrow = keys.get_public_key("escrow")?;
    let client = LocalClient::new(Ledger::new(FileStorage::open(settings.ledger_path())?));

    println!("Sending Alice's cancellation...");
    let cancellation = cancel_escrow(
        &client,
        &config,
        &env.alice,
        env.program_id,
        escrow,
        env.alice_x,
    )
    .await?;

    println!(
        "✨Escrow cancelled. {}X returned to Alice, all temporary accounts closed✨\n",
        cancellation.refunded
    );
    let rows = collect_balances(&client, &env.party_accounts()).await?;
    print!("{}", balance_table(&rows));
    Ok(())
}
