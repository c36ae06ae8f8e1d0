//! Creates the vault-transaction record and then its proposal.
//!
//! The two records go out as separate, sequential transactions. The proposal
//! is only sent once the vault transaction is confirmed, so a failure there
//! never leaves an orphaned proposal. A failure after it leaves the vault
//! transaction on chain, which is reported as a partial submission.

use anchor_client::solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    signer::Signer,
    transaction::Transaction,
};
use log::{info, warn};

use crate::{
    error::{LedgerError, ProposalError, Result},
    gateway::Ledger,
    squads::{SquadsVault, ERROR_ACCOUNT_IN_USE, ERROR_CONSTRAINT_SEEDS},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalReceipt {
    pub transaction_index: u64,
    pub vault_transaction: Pubkey,
    pub vault_transaction_signature: Signature,
    pub proposal: Pubkey,
    pub proposal_signature: Signature,
}

pub struct Envelope<'a> {
    pub vault: &'a SquadsVault,
    pub index: u64,
    /// Compact vault transaction message
    pub message: Vec<u8>,
    pub memo: Option<String>,
    pub compute_unit_price: Option<u64>,
}

impl<'a> Envelope<'a> {
    pub fn submit<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        signer: &dyn Signer,
    ) -> Result<ProposalReceipt> {
        let creator = signer.pubkey();
        let vault_transaction = self.vault.transaction(self.index)?;
        let create = self.vault.vault_transaction_create(
            self.index,
            &creator,
            &creator,
            self.message.clone(),
            self.memo.clone(),
        )?;
        let create_position = self.compute_unit_price.map_or(0, |_| 1);

        let vault_transaction_signature =
            send(ledger, signer, create, self.compute_unit_price).map_err(|err| {
                self.classify_create_failure(err, create_position, vault_transaction)
            })?;
        info!(
            "vault transaction {} created at index {}: {}",
            vault_transaction, self.index, vault_transaction_signature
        );

        let proposal = self.vault.proposal(self.index)?;
        let proposal_signature = self
            .vault
            .proposal_create(self.index, &creator, &creator)
            .and_then(|ix| send(ledger, signer, ix, self.compute_unit_price))
            .map_err(|err| ProposalError::PartialSubmission {
                index: self.index,
                vault_transaction,
                signature: vault_transaction_signature,
                source: Box::new(err),
            })?;
        info!(
            "proposal {} created for index {}: {}",
            proposal, self.index, proposal_signature
        );

        Ok(ProposalReceipt {
            transaction_index: self.index,
            vault_transaction,
            vault_transaction_signature,
            proposal,
            proposal_signature,
        })
    }

    fn classify_create_failure(
        &self,
        err: ProposalError,
        create_position: u8,
        vault_transaction: Pubkey,
    ) -> ProposalError {
        match err {
            ProposalError::Ledger(LedgerError::Simulation {
                instruction: Some(instruction),
                code: Some(code),
                ..
            }) if instruction == create_position
                && (code == ERROR_CONSTRAINT_SEEDS || code == ERROR_ACCOUNT_IN_USE) =>
            {
                ProposalError::StaleIndex { index: self.index }
            }
            err => ProposalError::VaultTransaction {
                index: self.index,
                vault_transaction,
                source: Box::new(err),
            },
        }
    }
}

/// Signs `instruction` with `signer` as fee payer and sends it. A rejection
/// for an expired blockhash is retried once with a fresh one.
pub fn send<L: Ledger + ?Sized>(
    ledger: &L,
    signer: &dyn Signer,
    instruction: Instruction,
    compute_unit_price: Option<u64>,
) -> Result<Signature> {
    let instructions: Vec<Instruction> = compute_unit_price
        .map(ComputeBudgetInstruction::set_compute_unit_price)
        .into_iter()
        .chain(std::iter::once(instruction))
        .collect();
    let payer = signer.pubkey();
    let signers = vec![signer];

    let mut retried = false;
    loop {
        let anchor = ledger.latest_anchor()?;
        let message = Message::new_with_blockhash(&instructions, Some(&payer), &anchor);
        let mut transaction = Transaction::new_unsigned(message);
        transaction
            .try_sign(&signers, anchor)
            .map_err(|e| ProposalError::Signing(e.to_string()))?;

        match ledger.submit(&transaction) {
            Err(LedgerError::AnchorExpired) if !retried => {
                warn!("blockhash {} expired before landing, retrying with a fresh one", anchor);
                retried = true;
            }
            result => return Ok(result?),
        }
    }
}
