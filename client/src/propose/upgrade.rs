use anchor_client::solana_sdk::{
    account::Account,
    bpf_loader_upgradeable::{self, UpgradeableLoaderState},
    instruction::Instruction,
    pubkey::Pubkey,
};
use log::{debug, info};

use crate::{
    address,
    batch::{self, UpgradePlan},
    envelope::ProposalReceipt,
    error::{ProposalError, Result},
    gateway::Ledger,
    loader::UpgradeOperation,
    service::UpgradeService,
};

/// Whether the batch grows the program-data account before upgrading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendPolicy {
    #[default]
    Skip,
    Bytes(u32),
    /// Grow by exactly what the buffer needs beyond the current allocation
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub program: Pubkey,
    pub buffer: Pubkey,
    /// Absent when the program has no IDL to update
    pub idl_buffer: Option<Pubkey>,
    /// Receives the buffer's lamports; the proposer when unset
    pub spill: Option<Pubkey>,
    pub extend: ExtendPolicy,
    /// Base64 legacy transaction holding a verification instruction
    pub verification: Option<String>,
}

impl UpgradeRequest {
    pub fn new(program: Pubkey, buffer: Pubkey) -> Self {
        Self {
            program,
            buffer,
            idl_buffer: None,
            spill: None,
            extend: ExtendPolicy::Skip,
            verification: None,
        }
    }
}

fn loader_state(account: &Account, address: &Pubkey) -> Result<UpgradeableLoaderState> {
    if account.owner != bpf_loader_upgradeable::id() {
        return Err(ProposalError::configuration(format!(
            "{} is not owned by the upgradeable loader",
            address
        )));
    }
    bincode::deserialize(&account.data).map_err(|e| {
        ProposalError::configuration(format!("cannot decode loader account {}: {}", address, e))
    })
}

fn expect_authority(
    what: &str,
    address: &Pubkey,
    actual: Option<Pubkey>,
    vault: &Pubkey,
) -> Result<()> {
    match actual {
        Some(authority) if authority == *vault => Ok(()),
        Some(authority) => Err(ProposalError::configuration(format!(
            "{} {} is controlled by {}, not by the vault {}",
            what, address, authority, vault
        ))),
        None => Err(ProposalError::configuration(format!(
            "{} {} is immutable",
            what, address
        ))),
    }
}

fn extension_bytes(
    policy: ExtendPolicy,
    buffer: &Account,
    program_data: &Account,
) -> Result<Option<u32>> {
    match policy {
        ExtendPolicy::Skip => Ok(None),
        ExtendPolicy::Bytes(0) => Err(ProposalError::configuration(
            "program extension must add at least one byte",
        )),
        ExtendPolicy::Bytes(bytes) => Ok(Some(bytes)),
        ExtendPolicy::Auto => {
            let code = buffer
                .data
                .len()
                .saturating_sub(UpgradeableLoaderState::size_of_buffer_metadata());
            let required = code + UpgradeableLoaderState::size_of_programdata_metadata();
            let missing = required.saturating_sub(program_data.data.len());
            if missing == 0 {
                debug!(
                    "program data already holds {} bytes, no extension",
                    program_data.data.len()
                );
                return Ok(None);
            }
            u32::try_from(missing).map(Some).map_err(|_| {
                ProposalError::configuration(format!("cannot extend by {} bytes", missing))
            })
        }
    }
}

/// Checks the accounts the upgrade touches and builds its batch: verification,
/// IDL, extension, upgrade. Nothing is submitted.
pub fn plan_upgrade<L: Ledger>(
    service: &UpgradeService<L>,
    request: &UpgradeRequest,
) -> Result<Vec<Instruction>> {
    let vault = service.vault.authority()?;

    let program = service.require_account(&request.program, "program")?;
    match loader_state(&program, &request.program)? {
        UpgradeableLoaderState::Program { .. } => {}
        _ => {
            return Err(ProposalError::configuration(format!(
                "{} is not an upgradeable program",
                request.program
            )))
        }
    }
    let (program_data_address, _) = address::program_data_address(&request.program)?;
    let program_data = service.require_account(&program_data_address, "program data")?;
    match loader_state(&program_data, &program_data_address)? {
        UpgradeableLoaderState::ProgramData {
            upgrade_authority_address,
            ..
        } => expect_authority("program", &request.program, upgrade_authority_address, &vault)?,
        _ => {
            return Err(ProposalError::configuration(format!(
                "{} is not program data",
                program_data_address
            )))
        }
    }

    let buffer = service.require_account(&request.buffer, "buffer")?;
    match loader_state(&buffer, &request.buffer)? {
        UpgradeableLoaderState::Buffer { authority_address } => {
            expect_authority("buffer", &request.buffer, authority_address, &vault)?
        }
        _ => {
            return Err(ProposalError::configuration(format!(
                "{} is not a buffer",
                request.buffer
            )))
        }
    }

    let mut plan = UpgradePlan::new().program_upgrade(
        UpgradeOperation::Upgrade {
            program: request.program,
            buffer: request.buffer,
            spill: request.spill.unwrap_or_else(|| service.payer.pubkey()),
            authority: vault,
        }
        .instruction()?,
    );

    if let Some(idl_buffer) = request.idl_buffer {
        service.require_account(&idl_buffer, "IDL buffer")?;
        plan = plan.idl_upgrade(
            UpgradeOperation::IdlSetBuffer {
                program: request.program,
                buffer: idl_buffer,
                authority: vault,
            }
            .instruction()?,
        );
    }

    if let Some(additional_bytes) = extension_bytes(request.extend, &buffer, &program_data)? {
        info!(
            "extending program data of {} by {} bytes",
            request.program, additional_bytes
        );
        plan = plan.extend(
            UpgradeOperation::Extend {
                program: request.program,
                additional_bytes,
                payer: Some(vault),
            }
            .instruction()?,
        );
    }

    if let Some(encoded) = &request.verification {
        plan = plan.verification(batch::verification_instruction(encoded)?);
    }

    Ok(plan.instructions())
}

/// Plans the upgrade batch and proposes it to the vault under the next
/// transaction index.
pub fn plan_and_submit_upgrade<L: Ledger>(
    service: &UpgradeService<L>,
    request: &UpgradeRequest,
) -> Result<ProposalReceipt> {
    let instructions = plan_upgrade(service, request)?;
    info!(
        "proposing upgrade of {} from buffer {} ({} instruction(s))",
        request.program,
        request.buffer,
        instructions.len()
    );
    service.propose_instructions(&instructions, service.memo.clone())
}
