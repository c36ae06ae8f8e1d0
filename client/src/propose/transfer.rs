use anchor_client::solana_sdk::{pubkey::Pubkey, system_instruction};

use crate::{
    envelope::ProposalReceipt,
    error::{ProposalError, Result},
    gateway::Ledger,
    service::UpgradeService,
};

/// Proposes moving `lamports` out of the vault, e.g. to refund a deployer.
pub fn propose_transfer<L: Ledger>(
    service: &UpgradeService<L>,
    recipient: &Pubkey,
    lamports: u64,
) -> Result<ProposalReceipt> {
    if lamports == 0 {
        return Err(ProposalError::configuration("transfer amount must be positive"));
    }
    let vault = service.vault.authority()?;
    let ix = system_instruction::transfer(&vault, recipient, lamports);
    service.propose_instructions(
        &[ix],
        Some(format!("Transfer {} lamports to {}", lamports, recipient)),
    )
}
