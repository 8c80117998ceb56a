use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use swapcrow_client::{ClientConfig, EscrowClient, OfferTerms};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "./swapcrow.json";

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = ClientConfig::load_or_default(&cli.config)?;
    let mut client = EscrowClient::new(config)?;

    match cli.command {
        Commands::Keygen { name } => {
            let address = client.keygen(&name)?;
            println!("{name}: {address}");
        }
        Commands::Airdrop { to, lamports } => {
            let to = client.airdrop(&to, lamports)?;
            client.save()?;
            tracing::info!(%to, lamports, "Airdrop complete");
        }
        Commands::CreateMint {
            name,
            authority,
            decimals,
        } => {
            let asset = client.create_mint(&name, &authority, decimals)?;
            client.save()?;
            println!("{name}: {asset}");
        }
        Commands::MintTo {
            asset,
            authority,
            to,
            amount,
        } => {
            client.mint_to(&asset, &authority, &to, amount)?;
            client.save()?;
            tracing::info!("Minted successfully");
        }
        Commands::Open {
            owner,
            payer,
            nonce,
            offered,
            amount_offered,
            requested,
            amount_requested,
        } => {
            let terms = OfferTerms {
                nonce,
                asset_offered: offered,
                amount_offered,
                asset_requested: requested,
                amount_requested,
            };
            let receipt = client.open(&owner, payer.as_deref(), &terms)?;
            client.save()?;
            println!("{}", receipt.record);
            tracing::info!("Offer opened successfully");
        }
        Commands::Fulfill { taker, record } => {
            client.fulfill(&taker, &record)?;
            client.save()?;
            tracing::info!("Offer fulfilled successfully");
        }
        Commands::Cancel { owner, record } => {
            client.cancel(&owner, &record)?;
            client.save()?;
            tracing::info!("Offer cancelled successfully");
        }
        Commands::Show { record } => {
            let view = client.show(&record)?;
            println!("{}", view.summary(client.ledger()));
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Balance { owner, asset } => {
            let (lamports, holding) = client.balance(&owner, asset.as_deref())?;
            println!("lamports: {lamports}");
            if let Some(amount) = holding {
                println!("holding: {amount}");
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "swapcrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long,
        value_parser,
        default_value = DEFAULT_CONFIG_PATH,
        value_hint = ValueHint::FilePath)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Parties and assets are key names from the keypair directory or addresses.
#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair and store it under `name`
    Keygen { name: String },
    /// Credit lamports for storage deposits
    Airdrop {
        to: String,
        #[arg(short, long)]
        lamports: u64,
    },
    /// Register a new asset, stored as key `name`
    CreateMint {
        name: String,
        #[arg(short, long)]
        authority: String,
        #[arg(short, long, default_value_t = 6)]
        decimals: u8,
    },
    /// Issue units of an asset
    MintTo {
        asset: String,
        #[arg(short, long)]
        authority: String,
        #[arg(short, long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Lock an amount of one asset in exchange for another
    Open {
        #[arg(long)]
        owner: String,
        /// Funds the deposits (defaults to the owner)
        #[arg(long)]
        payer: Option<String>,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        offered: String,
        #[arg(long)]
        amount_offered: u64,
        #[arg(long)]
        requested: String,
        #[arg(long)]
        amount_requested: u64,
    },
    /// Pay the requested amount and take the locked one
    Fulfill {
        #[arg(long)]
        taker: String,
        record: String,
    },
    /// Close an offer and take back the locked amount
    Cancel {
        #[arg(long)]
        owner: String,
        record: String,
    },
    /// Print an open offer
    Show { record: String },
    /// Print lamports and, optionally, the balance of one asset
    Balance {
        owner: String,
        #[arg(short, long)]
        asset: Option<String>,
    },
}
