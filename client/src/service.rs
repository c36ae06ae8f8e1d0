//! Proposal workflows built on top of the governance program's core instructions.

use std::rc::Rc;

use anchor_client::solana_sdk::{
    account::Account, instruction::Instruction, pubkey::Pubkey, signature::Signature,
    signer::Signer,
};
use log::{info, warn};

use crate::{
    batch,
    envelope::{self, Envelope, ProposalReceipt},
    error::{ProposalError, Result},
    gateway::Ledger,
    inspect,
    loader::UpgradeOperation,
    sequencer::Sequencer,
    squads::{Member, SquadsVault, VaultTransactionMessage},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInfo {
    pub multisig: Pubkey,
    pub vault: Pubkey,
    pub transaction_index: u64,
    pub stale_transaction_index: u64,
    pub threshold: u16,
    pub time_lock: u32,
    pub members: Vec<Member>,
}

pub struct UpgradeService<L> {
    pub ledger: L,
    pub payer: Rc<dyn Signer>,
    pub vault: SquadsVault,
    pub sequencer: Sequencer,
    /// Memo attached to upgrade proposals
    pub memo: Option<String>,
    pub compute_unit_price: Option<u64>,
}

impl<L: Ledger> UpgradeService<L> {
    pub fn new(ledger: L, payer: Rc<dyn Signer>, vault: SquadsVault) -> Self {
        Self {
            ledger,
            payer,
            vault,
            sequencer: Sequencer::new(),
            memo: None,
            compute_unit_price: None,
        }
    }

    pub fn with_memo(self, memo: Option<String>) -> Self {
        Self { memo, ..self }
    }

    pub fn with_compute_unit_price(self, compute_unit_price: Option<u64>) -> Self {
        Self {
            compute_unit_price,
            ..self
        }
    }

    pub fn vault_info(&self) -> Result<VaultInfo> {
        let state = self.vault.read_state(&self.ledger)?;
        Ok(VaultInfo {
            multisig: self.vault.multisig,
            vault: self.vault.authority()?,
            transaction_index: state.transaction_index,
            stale_transaction_index: state.stale_transaction_index,
            threshold: state.threshold,
            time_lock: state.time_lock,
            members: state.members,
        })
    }

    /// Fetches an account that a proposal is about to reference.
    pub fn require_account(&self, address: &Pubkey, what: &str) -> Result<Account> {
        self.ledger.account(address)?.ok_or_else(|| {
            ProposalError::configuration(format!("{} {} does not exist", what, address))
        })
    }

    /// The message the vault would execute for `instructions`, without submitting anything.
    pub fn preview(&self, instructions: &[Instruction]) -> Result<VaultTransactionMessage> {
        if instructions.is_empty() {
            return Err(ProposalError::configuration(
                "a proposal needs at least one instruction",
            ));
        }
        let anchor = self.ledger.latest_anchor()?;
        let message = batch::compose(instructions, &self.vault.authority()?, anchor);
        batch::vault_message(&message)
    }

    /// Proposes `instructions` as one vault transaction. An index lost to a
    /// concurrent proposer is retried once against a fresh read of the
    /// counter, dropping local reservations; a second loss is returned to the
    /// caller.
    pub fn propose_instructions(
        &self,
        instructions: &[Instruction],
        memo: Option<String>,
    ) -> Result<ProposalReceipt> {
        let message = self.preview(instructions)?.to_compact_bytes()?;

        let mut retried = false;
        loop {
            let index = self.sequencer.next_index(&self.ledger, &self.vault)?;
            let envelope = Envelope {
                vault: &self.vault,
                index,
                message: message.clone(),
                memo: memo.clone(),
                compute_unit_price: self.compute_unit_price,
            };

            match envelope.submit(&self.ledger, &*self.payer) {
                Ok(receipt) => return Ok(receipt),
                Err(ProposalError::StaleIndex { index }) if !retried => {
                    warn!("index {} was taken by another proposer, re-reading the vault", index);
                    self.sequencer.reset();
                    retried = true;
                }
                Err(err) => {
                    if !err.may_have_consumed_index() || self.never_landed(&err) {
                        self.sequencer.release(index);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// A vault transaction whose fate was unknown has no record on chain.
    fn never_landed(&self, err: &ProposalError) -> bool {
        match err {
            ProposalError::VaultTransaction {
                vault_transaction, ..
            } => matches!(self.ledger.account(vault_transaction), Ok(None)),
            _ => false,
        }
    }

    /// Hands `buffer` to `new_authority` (the vault by default). The local
    /// key must be the buffer's current authority; this is sent directly,
    /// not proposed.
    pub fn transfer_buffer_authority(
        &self,
        buffer: &Pubkey,
        new_authority: Option<Pubkey>,
    ) -> Result<Signature> {
        self.require_account(buffer, "buffer")?;
        let new_authority = match new_authority {
            Some(authority) => authority,
            None => self.vault.authority()?,
        };
        let instruction = UpgradeOperation::SetBufferAuthority {
            buffer: *buffer,
            current_authority: self.payer.pubkey(),
            new_authority,
        }
        .instruction()?;

        let signature = envelope::send(
            &self.ledger,
            &*self.payer,
            instruction,
            self.compute_unit_price,
        )?;
        info!(
            "authority of buffer {} moved to {}: {}",
            buffer, new_authority, signature
        );
        Ok(signature)
    }

    /// Describes the vault transaction stored at `index`.
    pub fn inspect(&self, index: u64) -> Result<Vec<String>> {
        let transaction = self.vault.read_transaction(&self.ledger, index)?;
        inspect::describe_transaction(&transaction)
    }
}
