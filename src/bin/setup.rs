use anyhow::Context;
use escrow_swap::bootstrap::bootstrap;
use escrow_swap::config::{Settings, Terms};
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
    std::fs::create_dir_all(settings.root())
        .with_context(|| format!("cannot create {}", settings.root().display()))?;

    // Every setup starts from an empty ledger.
    let ledger_path = settings.ledger_path();
    if ledger_path.exists() {
        std::fs::remove_file(&ledger_path)
            .with_context(|| format!("cannot reset {}", ledger_path.display()))?;
    }

    let terms_path = settings.terms_path();
    let terms = if terms_path.exists() {
        Terms::load(&terms_path)?
    } else {
        let terms = Terms::default();
        terms.save(&terms_path)?;
        terms
    };

    let client = LocalClient::new(Ledger::new(FileStorage::open(&ledger_path)?));
    let env = bootstrap(&client, &terms).await?;
    env.save(&KeyStore::new(settings.keys_dir()))?;

    println!("✨Setup complete. Escrow program deployed at {}✨\n", env.program_id);
    let rows = collect_balances(&client, &env.party_accounts()).await?;
    print!("{}", balance_table(&rows));
    Ok(())
}
