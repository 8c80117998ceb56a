use serde::{Deserialize, Serialize};
use swapcrow_core::interface::{load_escrow_data, save_escrow_data};
use swapcrow_core::{Address, Instruction, Keypair, Ledger, OfferView, Receipt, Transaction};
use tracing::info;

pub use config::ClientConfig;
use error::{ClientError, Result};

pub mod config;
pub mod error;

/// On-disk form of a keypair: the address plus the hex-encoded secret seed.
#[derive(Debug, Serialize, Deserialize)]
struct KeypairFile {
    address: Address,
    #[serde(with = "hex::serde")]
    secret: [u8; 32],
}

/// Terms of an offer as entered by the user; parties and assets are key
/// names or addresses.
#[derive(Debug, Clone)]
pub struct OfferTerms {
    pub nonce: u64,
    pub asset_offered: String,
    pub amount_offered: u64,
    pub asset_requested: String,
    pub amount_requested: u64,
}

/// Drives the escrow against a ledger snapshot on disk, signing with
/// keypairs from the configured directory.
pub struct EscrowClient {
    config: ClientConfig,
    ledger: Ledger,
}

impl EscrowClient {
    /// Loads the ledger at `config.ledger_path`, starting empty if there is none yet.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let ledger = if config.ledger_path.exists() {
            load_escrow_data(&config.ledger_path)?
        } else {
            Ledger::new()
        };
        Ok(Self { config, ledger })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn save(&self) -> Result<()> {
        save_escrow_data(&self.config.ledger_path, &self.ledger)?;
        Ok(())
    }

    /// Generates and stores a new keypair under `name`.
    pub fn keygen(&self, name: &str) -> Result<Address> {
        let path = self.config.keypair_path(name);
        if path.exists() {
            return Err(ClientError::Keypair(format!("{path:?} already exists")));
        }
        let keypair = Keypair::generate();
        let file = KeypairFile {
            address: keypair.address(),
            secret: keypair.secret_bytes(),
        };
        save_escrow_data(&path, &file)?;
        Ok(file.address)
    }

    pub fn keypair(&self, name: &str) -> Result<Keypair> {
        let path = self.config.keypair_path(name);
        if !path.exists() {
            return Err(ClientError::UnknownKey(name.to_string()));
        }
        let file: KeypairFile = load_escrow_data(&path)?;
        let keypair = Keypair::from_seed(file.secret);
        if keypair.address() != file.address {
            return Err(ClientError::Keypair(format!(
                "{path:?}: secret does not match address {}",
                file.address
            )));
        }
        Ok(keypair)
    }

    /// Resolves a key name from the keypair directory, or parses an address.
    pub fn resolve(&self, name_or_address: &str) -> Result<Address> {
        if self.config.keypair_path(name_or_address).exists() {
            return Ok(self.keypair(name_or_address)?.address());
        }
        Ok(name_or_address.parse()?)
    }

    pub fn airdrop(&mut self, to: &str, lamports: u64) -> Result<Address> {
        let to = self.resolve(to)?;
        self.ledger.airdrop(&to, lamports)?;
        Ok(to)
    }

    /// Registers a new asset under a fresh address, stored as key `name`.
    pub fn create_mint(&mut self, name: &str, authority: &str, decimals: u8) -> Result<Address> {
        let authority = self.resolve(authority)?;
        let asset = self.keygen(name)?;
        self.ledger.create_mint(&asset, &authority, decimals)?;
        info!(%asset, %authority, decimals, "asset created");
        Ok(asset)
    }

    pub fn mint_to(&mut self, asset: &str, authority: &str, to: &str, amount: u64) -> Result<()> {
        let asset = self.resolve(asset)?;
        let authority = self.keypair(authority)?.address();
        let to = self.resolve(to)?;
        self.ledger.mint_to(&asset, &authority, &to, amount)?;
        Ok(())
    }

    /// Opens an offer by key `owner`; `payer` (default: the owner) funds the deposits.
    pub fn open(
        &mut self,
        owner: &str,
        payer: Option<&str>,
        terms: &OfferTerms,
    ) -> Result<Receipt> {
        let owner = self.keypair(owner)?;
        let payer = payer.map(|p| self.keypair(p)).transpose()?;
        let instruction = Instruction::Open {
            owner: owner.address(),
            payer: payer.as_ref().unwrap_or(&owner).address(),
            nonce: terms.nonce,
            asset_offered: self.resolve(&terms.asset_offered)?,
            asset_requested: self.resolve(&terms.asset_requested)?,
            amount_requested: terms.amount_requested,
            amount_offered: terms.amount_offered,
        };
        let mut signers = vec![&owner];
        signers.extend(payer.as_ref());
        self.submit(instruction, &signers)
    }

    /// Fulfills the offer at `record` as key `taker`, at the terms currently
    /// on the ledger.
    pub fn fulfill(&mut self, taker: &str, record: &str) -> Result<Receipt> {
        let taker = self.keypair(taker)?;
        let record = self.resolve(record)?;
        let view = OfferView::load(&self.ledger, &record)?;
        info!(terms = %view.summary(&self.ledger), "fulfilling");
        let instruction = Instruction::Fulfill {
            taker: taker.address(),
            owner: view.offer.owner,
            record,
            terms: view.terms(),
        };
        self.submit(instruction, &[&taker])
    }

    pub fn cancel(&mut self, owner: &str, record: &str) -> Result<Receipt> {
        let owner = self.keypair(owner)?;
        let record = self.resolve(record)?;
        let instruction = Instruction::Cancel {
            owner: owner.address(),
            record,
        };
        self.submit(instruction, &[&owner])
    }

    pub fn show(&self, record: &str) -> Result<OfferView> {
        let record = self.resolve(record)?;
        Ok(OfferView::load(&self.ledger, &record)?)
    }

    /// Lamports of `owner` and, if given, its balance of `asset`.
    pub fn balance(&self, owner: &str, asset: Option<&str>) -> Result<(u64, Option<u64>)> {
        let owner = self.resolve(owner)?;
        let holding = match asset {
            Some(asset) => {
                let asset = self.resolve(asset)?;
                Some(self.ledger.holding_balance(&owner, &asset).unwrap_or(0))
            }
            None => None,
        };
        Ok((self.ledger.lamports(&owner), holding))
    }

    fn submit(&mut self, instruction: Instruction, signers: &[&Keypair]) -> Result<Receipt> {
        let tx = Transaction::new(instruction, signers, &self.ledger)?;
        let receipt = self.ledger.process_transaction(&tx)?;
        info!(record = %receipt.record, state = ?receipt.state, "transaction committed");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use swapcrow_core::{EscrowError, EscrowState};

    use super::*;

    fn scratch(name: &str) -> ClientConfig {
        let dir: PathBuf =
            std::env::temp_dir().join(format!("swapcrow-client-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ClientConfig {
            ledger_path: dir.join("ledger.json"),
            keypair_dir: dir.join("keys"),
        }
    }

    #[test]
    fn keys_resolve_by_name_or_address() {
        let config = scratch("keys");
        let client = EscrowClient::new(config.clone()).unwrap();
        let alice = client.keygen("alice").unwrap();

        assert_eq!(client.resolve("alice").unwrap(), alice);
        assert_eq!(client.resolve(&alice.to_string()).unwrap(), alice);
        assert_eq!(client.keypair("alice").unwrap().address(), alice);
        assert!(matches!(client.keygen("alice"), Err(ClientError::Keypair(_))));
        assert!(matches!(
            client.keypair("bob"),
            Err(ClientError::UnknownKey(_))
        ));
        assert!(matches!(client.resolve("bob"), Err(ClientError::Address(_))));

        let _ = std::fs::remove_dir_all(config.keypair_dir.parent().unwrap());
    }

    #[test]
    fn swap_through_the_client() {
        let config = scratch("swap");
        let mut client = EscrowClient::new(config.clone()).unwrap();
        for name in ["maker", "taker", "issuer"] {
            client.keygen(name).unwrap();
            client.airdrop(name, 50_000_000).unwrap();
        }
        client.create_mint("usd", "issuer", 2).unwrap();
        client.create_mint("eur", "issuer", 2).unwrap();
        client.mint_to("usd", "issuer", "maker", 1_000).unwrap();
        client.mint_to("eur", "issuer", "taker", 1_000).unwrap();

        let terms = OfferTerms {
            nonce: 1,
            asset_offered: "usd".into(),
            amount_offered: 100,
            asset_requested: "eur".into(),
            amount_requested: 90,
        };
        let receipt = client.open("maker", None, &terms).unwrap();
        let record = receipt.record.to_string();
        assert_eq!(client.show(&record).unwrap().locked, 100);
        client.save().unwrap();

        // a fresh client sees the saved offer
        let mut client = EscrowClient::new(config.clone()).unwrap();
        let receipt = client.fulfill("taker", &record).unwrap();
        assert_eq!(receipt.state, EscrowState::Fulfilled);
        assert_eq!(client.balance("taker", Some("usd")).unwrap().1, Some(100));
        assert_eq!(client.balance("maker", Some("eur")).unwrap().1, Some(90));

        assert!(matches!(
            client.cancel("maker", &record),
            Err(ClientError::Escrow(EscrowError::RecordNotFound(_)))
        ));

        // sequence numbers survive the snapshot
        client.save().unwrap();
        let client = EscrowClient::new(config.clone()).unwrap();
        let maker = client.resolve("maker").unwrap();
        let taker = client.resolve("taker").unwrap();
        assert_eq!(client.ledger().sequence(&maker), 1);
        assert_eq!(client.ledger().sequence(&taker), 1);

        let _ = std::fs::remove_dir_all(config.keypair_dir.parent().unwrap());
    }
}
