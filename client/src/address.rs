//! Deterministic addresses touched by an upgrade proposal.
//!
//! Everything here is a pure function of its inputs. A derivation that has no
//! valid bump is reported as a configuration error and never retried.

use anchor_client::solana_sdk::{bpf_loader_upgradeable, pubkey::Pubkey};

use crate::error::{ProposalError, Result};

pub const SEED_PREFIX: &[u8] = b"multisig";
pub const SEED_VAULT: &[u8] = b"vault";
pub const SEED_TRANSACTION: &[u8] = b"transaction";
pub const SEED_PROPOSAL: &[u8] = b"proposal";

/// Seed Anchor uses for the account holding a program's IDL.
pub const IDL_SEED: &str = "anchor:idl";

fn find(seeds: &[&[u8]], program_id: &Pubkey, what: &str) -> Result<(Pubkey, u8)> {
    Pubkey::try_find_program_address(seeds, program_id).ok_or_else(|| {
        ProposalError::configuration(format!(
            "no valid {} address exists under program {}",
            what, program_id
        ))
    })
}

/// Execution authority of the vault: fee payer and upgrade authority of the
/// batch once the governance program executes it.
pub fn vault_address(
    governance_program: &Pubkey,
    multisig: &Pubkey,
    vault_index: u8,
) -> Result<(Pubkey, u8)> {
    find(
        &[SEED_PREFIX, multisig.as_ref(), SEED_VAULT, &[vault_index]],
        governance_program,
        "vault",
    )
}

/// Account holding the executable bytes and upgrade authority of `program`.
pub fn program_data_address(program: &Pubkey) -> Result<(Pubkey, u8)> {
    find(
        &[program.as_ref()],
        &bpf_loader_upgradeable::id(),
        "program data",
    )
}

/// Anchor's IDL account: seeded from the program's empty-seed signer.
pub fn idl_address(program: &Pubkey) -> Result<Pubkey> {
    let (base, _) = find(&[], program, "IDL base")?;
    Pubkey::create_with_seed(&base, IDL_SEED, program).map_err(|e| {
        ProposalError::configuration(format!("cannot derive IDL address of {}: {}", program, e))
    })
}

pub fn transaction_address(
    governance_program: &Pubkey,
    multisig: &Pubkey,
    index: u64,
) -> Result<(Pubkey, u8)> {
    find(
        &[
            SEED_PREFIX,
            multisig.as_ref(),
            SEED_TRANSACTION,
            &index.to_le_bytes(),
        ],
        governance_program,
        "vault transaction",
    )
}

pub fn proposal_address(
    governance_program: &Pubkey,
    multisig: &Pubkey,
    index: u64,
) -> Result<(Pubkey, u8)> {
    find(
        &[
            SEED_PREFIX,
            multisig.as_ref(),
            SEED_TRANSACTION,
            &index.to_le_bytes(),
            SEED_PROPOSAL,
        ],
        governance_program,
        "proposal",
    )
}
