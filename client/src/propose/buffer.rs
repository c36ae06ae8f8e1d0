use anchor_client::solana_sdk::{bpf_loader_upgradeable, pubkey::Pubkey};

use crate::{
    envelope::ProposalReceipt,
    error::{ProposalError, Result},
    gateway::Ledger,
    loader::UpgradeOperation,
    service::UpgradeService,
};

/// Proposes closing a vault-owned buffer. The lamports go to `recipient`,
/// or back to the vault when none is given.
pub fn propose_close_buffer<L: Ledger>(
    service: &UpgradeService<L>,
    buffer: &Pubkey,
    recipient: Option<Pubkey>,
) -> Result<ProposalReceipt> {
    let account = service.require_account(buffer, "buffer")?;
    if account.owner != bpf_loader_upgradeable::id() {
        return Err(ProposalError::configuration(format!(
            "{} is not an upgradeable-loader buffer",
            buffer
        )));
    }

    let vault = service.vault.authority()?;
    let ix = UpgradeOperation::CloseBuffer {
        buffer: *buffer,
        recipient: recipient.unwrap_or(vault),
        authority: vault,
    }
    .instruction()?;
    service.propose_instructions(&[ix], Some(format!("Close buffer {}", buffer)))
}
