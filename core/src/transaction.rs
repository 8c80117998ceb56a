//! Signed transactions and their execution against the [`Ledger`].
//!
//! A [`Transaction`] carries one [`Instruction`] and one ed25519 signature per
//! required signer, each over the bincode encoding of the [`Message`]. The
//! message also pins every signer's next sequence number, so a transaction
//! commits at most once and is dead as soon as its signer moves on.
//! Execution is split in two: [`Ledger::prepare`] runs the instruction
//! against a read-only overlay and returns the change set, and
//! [`Ledger::commit`] applies it with per-account compare-and-swap.
//! [`Ledger::process_transaction`] does both.

use bincode::{Decode, Encode};
use tracing::{instrument, warn};

use crate::escrow::{self, OpenArgs, Signers, SwapTerms};
use crate::identity::{Address, Keypair, Signature};
use crate::interface::EscrowState;
use crate::ledger::{ChangeSet, Ledger};
use crate::{EscrowError, Result};

/// An escrow transition.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Instruction {
    Open {
        owner: Address,
        /// Funds the record and vault deposits and receives them back on closure.
        payer: Address,
        nonce: u64,
        asset_offered: Address,
        asset_requested: Address,
        amount_requested: u64,
        amount_offered: u64,
    },
    Fulfill {
        taker: Address,
        owner: Address,
        record: Address,
        /// What the taker expects to receive and pay.
        terms: SwapTerms,
    },
    Cancel {
        owner: Address,
        record: Address,
    },
}

impl Instruction {
    /// Identities that must sign, deduplicated, in order.
    pub fn required_signers(&self) -> Vec<Address> {
        match self {
            Self::Open { owner, payer, .. } if owner == payer => vec![*owner],
            Self::Open { owner, payer, .. } => vec![*owner, *payer],
            Self::Fulfill { taker, .. } => vec![*taker],
            Self::Cancel { owner, .. } => vec![*owner],
        }
    }
}

/// The signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    pub instruction: Instruction,
    /// Each signer with the sequence number this message consumes.
    pub signers: Vec<(Address, u64)>,
}

impl Message {
    /// A message for `instruction` at the signers' current sequence numbers.
    pub fn new(instruction: Instruction, ledger: &Ledger) -> Self {
        let signers = instruction
            .required_signers()
            .into_iter()
            .map(|signer| (signer, ledger.sequence(&signer)))
            .collect();
        Self {
            instruction,
            signers,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Transaction {
    pub message: Message,
    /// One per `message.signers`, same order.
    pub signatures: Vec<Signature>,
}

impl Transaction {
    /// Builds and signs a transaction against the current state of `ledger`.
    /// `keypairs` must contain every required signer; extra keypairs are ignored.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidAuthorization`] naming the first missing signer.
    pub fn new(instruction: Instruction, keypairs: &[&Keypair], ledger: &Ledger) -> Result<Self> {
        Self::sign(Message::new(instruction, ledger), keypairs)
    }

    /// Signs `message` with the keypairs of its signers.
    pub fn sign(message: Message, keypairs: &[&Keypair]) -> Result<Self> {
        let bytes = message.to_bytes()?;
        let signatures = message
            .signers
            .iter()
            .map(|(signer, _)| {
                keypairs
                    .iter()
                    .find(|kp| kp.address() == *signer)
                    .map(|kp| kp.sign(&bytes))
                    .ok_or(EscrowError::InvalidAuthorization { expected: *signer })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            message,
            signatures,
        })
    }

    /// Checks every signature and returns the verified signers.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::InvalidSignature`] for a bad or missing signature.
    /// - [`EscrowError::InvalidAuthorization`] if the message omits a signer
    ///   its instruction requires.
    pub fn verify(&self) -> Result<Vec<Address>> {
        let bytes = self.message.to_bytes()?;
        for (i, (signer, _)) in self.message.signers.iter().enumerate() {
            let signature = self
                .signatures
                .get(i)
                .ok_or(EscrowError::InvalidSignature(*signer))?;
            signer.verify(&bytes, signature)?;
        }
        let signers: Vec<Address> = self.message.signers.iter().map(|(s, _)| *s).collect();
        for required in self.message.instruction.required_signers() {
            if !signers.contains(&required) {
                return Err(EscrowError::InvalidAuthorization { expected: required });
            }
        }
        Ok(signers)
    }
}

/// Outcome of an executed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub record: Address,
    /// State the offer is in after the transaction.
    pub state: EscrowState,
}

impl Ledger {
    /// Verifies and executes `tx` against the current state without applying it.
    ///
    /// # Errors
    ///
    /// Besides the escrow errors, [`EscrowError::StaleSequence`] if a signer's
    /// sequence number has moved past the one `tx` was signed with.
    pub fn prepare(&self, tx: &Transaction) -> Result<(ChangeSet, Receipt)> {
        let verified = tx.verify()?;
        for (signer, sequence) in &tx.message.signers {
            let expected = self.sequence(signer);
            if *sequence != expected {
                return Err(EscrowError::StaleSequence {
                    signer: *signer,
                    expected,
                    actual: *sequence,
                });
            }
        }
        let signers = Signers(&verified);
        let mut ctx = self.begin();

        let receipt = match &tx.message.instruction {
            Instruction::Open {
                owner,
                payer,
                nonce,
                asset_offered,
                asset_requested,
                amount_requested,
                amount_offered,
            } => {
                let args = OpenArgs {
                    nonce: *nonce,
                    asset_offered: *asset_offered,
                    asset_requested: *asset_requested,
                    amount_requested: *amount_requested,
                    amount_offered: *amount_offered,
                };
                let record = escrow::open(&mut ctx, signers, owner, payer, &args)?;
                Receipt {
                    record,
                    state: EscrowState::Open,
                }
            }
            Instruction::Fulfill {
                taker,
                owner,
                record,
                terms,
            } => {
                escrow::fulfill(&mut ctx, signers, taker, owner, record, terms)?;
                Receipt {
                    record: *record,
                    state: EscrowState::Fulfilled,
                }
            }
            Instruction::Cancel { owner, record } => {
                escrow::cancel(&mut ctx, signers, owner, record)?;
                Receipt {
                    record: *record,
                    state: EscrowState::Cancelled,
                }
            }
        };
        let mut changes = ctx.into_changes();
        for (signer, sequence) in &tx.message.signers {
            changes.advance_sequence(signer, *sequence);
        }
        Ok((changes, receipt))
    }

    /// Verifies, executes and commits `tx`. On any error the ledger is unchanged.
    #[instrument(skip_all, fields(signers = tx.message.signers.len()))]
    pub fn process_transaction(&mut self, tx: &Transaction) -> Result<Receipt> {
        let result = self
            .prepare(tx)
            .and_then(|(changes, receipt)| self.commit(changes).map(|()| receipt));
        if let Err(e) = &result {
            warn!(error = %e, retryable = e.is_retryable(), "transaction rejected");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(n: u8) -> Keypair {
        Keypair::from_seed([n; 32])
    }

    fn cancel_ix(owner: &Keypair) -> Instruction {
        Instruction::Cancel {
            owner: owner.address(),
            record: kp(9).address(),
        }
    }

    #[test]
    fn open_signers_are_deduplicated() {
        let owner = kp(1).address();
        let ix = Instruction::Open {
            owner,
            payer: owner,
            nonce: 0,
            asset_offered: owner,
            asset_requested: owner,
            amount_requested: 1,
            amount_offered: 1,
        };
        assert_eq!(ix.required_signers(), vec![owner]);
    }

    #[test]
    fn signed_transaction_verifies() {
        let owner = kp(1);
        let tx = Transaction::new(cancel_ix(&owner), &[&owner], &Ledger::new()).unwrap();
        assert_eq!(tx.verify().unwrap(), vec![owner.address()]);
        assert_eq!(tx.message.signers, vec![(owner.address(), 0)]);
    }

    #[test]
    fn missing_keypair_is_rejected() {
        let owner = kp(1);
        assert_eq!(
            Transaction::new(cancel_ix(&owner), &[&kp(2)], &Ledger::new()),
            Err(EscrowError::InvalidAuthorization {
                expected: owner.address()
            })
        );
    }

    #[test]
    fn tampered_transaction_fails_verification() {
        let owner = kp(1);
        let mut tx = Transaction::new(cancel_ix(&owner), &[&owner], &Ledger::new()).unwrap();
        tx.message.instruction = Instruction::Cancel {
            owner: owner.address(),
            record: kp(8).address(),
        };
        assert_eq!(
            tx.verify(),
            Err(EscrowError::InvalidSignature(owner.address()))
        );

        // the sequence number is signed too
        let mut tx = Transaction::new(cancel_ix(&owner), &[&owner], &Ledger::new()).unwrap();
        tx.message.signers[0].1 = 5;
        assert_eq!(
            tx.verify(),
            Err(EscrowError::InvalidSignature(owner.address()))
        );
    }

    #[test]
    fn sequence_must_be_current() {
        let owner = kp(1);
        let ledger = Ledger::new();
        let mut message = Message::new(cancel_ix(&owner), &ledger);
        message.signers[0].1 = 3;
        let tx = Transaction::sign(message, &[&owner]).unwrap();
        assert!(matches!(
            ledger.prepare(&tx),
            Err(EscrowError::StaleSequence {
                expected: 0,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn signer_list_must_cover_instruction() {
        let owner = kp(1);
        let mallory = kp(2);
        let mut message = Message::new(cancel_ix(&owner), &Ledger::new());
        message.signers = vec![(mallory.address(), 0)];
        let sig = mallory.sign(&message.to_bytes().unwrap());
        let tx = Transaction {
            message,
            signatures: vec![sig],
        };
        assert_eq!(
            tx.verify(),
            Err(EscrowError::InvalidAuthorization {
                expected: owner.address()
            })
        );
    }
}
