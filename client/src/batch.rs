//! Assembles instructions into the single atomic message a vault executes.

use anchor_client::solana_sdk::{
    compute_budget,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    transaction::Transaction,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    error::{ProposalError, Result},
    squads::{CompiledInstruction, VaultTransactionMessage},
};

/// Compiles `instructions` in the order given. Nothing is reordered or
/// deduplicated; the vault pays fees.
pub fn compose(instructions: &[Instruction], payer: &Pubkey, anchor: Hash) -> Message {
    Message::new_with_blockhash(instructions, Some(payer), &anchor)
}

/// Converts a compiled message into the governance program's message form.
/// The anchor is dropped: the governance program supplies its own when the
/// batch is executed.
pub fn vault_message(message: &Message) -> Result<VaultTransactionMessage> {
    let header = &message.header;
    let key_count = message.account_keys.len();
    let num_signers = header.num_required_signatures as usize;
    let writable_signers = num_signers
        .checked_sub(header.num_readonly_signed_accounts as usize)
        .ok_or_else(|| ProposalError::configuration("malformed message header"))?;
    let writable_non_signers = key_count
        .checked_sub(num_signers + header.num_readonly_unsigned_accounts as usize)
        .ok_or_else(|| ProposalError::configuration("malformed message header"))?;
    let too_large =
        || ProposalError::configuration(format!("message references {} accounts", key_count));

    Ok(VaultTransactionMessage {
        num_signers: header.num_required_signatures,
        num_writable_signers: u8::try_from(writable_signers).map_err(|_| too_large())?,
        num_writable_non_signers: u8::try_from(writable_non_signers).map_err(|_| too_large())?,
        account_keys: message.account_keys.clone(),
        instructions: message
            .instructions
            .iter()
            .map(|ix| CompiledInstruction {
                program_id_index: ix.program_id_index,
                account_indexes: ix.accounts.clone(),
                data: ix.data.clone(),
            })
            .collect(),
        address_table_lookups: Vec::new(),
    })
}

/// Named slots for the program-upgrade batch. Whatever order the slots are
/// filled in, the batch comes out as verification, IDL, extension, upgrade:
/// once the program is upgraded mid-batch the IDL step would see it as not
/// deployed.
#[derive(Debug, Default, Clone)]
pub struct UpgradePlan {
    verification: Option<Instruction>,
    idl_upgrade: Option<Instruction>,
    extend: Option<Instruction>,
    program_upgrade: Option<Instruction>,
}

impl UpgradePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verification(mut self, ix: Instruction) -> Self {
        self.verification = Some(ix);
        self
    }

    pub fn idl_upgrade(mut self, ix: Instruction) -> Self {
        self.idl_upgrade = Some(ix);
        self
    }

    pub fn extend(mut self, ix: Instruction) -> Self {
        self.extend = Some(ix);
        self
    }

    pub fn program_upgrade(mut self, ix: Instruction) -> Self {
        self.program_upgrade = Some(ix);
        self
    }

    pub fn instructions(self) -> Vec<Instruction> {
        [
            self.verification,
            self.idl_upgrade,
            self.extend,
            self.program_upgrade,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Pulls the verification instruction out of a base64, bincode-encoded legacy
/// transaction: the first instruction that is not a compute-budget one.
pub fn verification_instruction(encoded: &str) -> Result<Instruction> {
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
        ProposalError::configuration(format!("verification payload is not base64: {}", e))
    })?;
    let transaction: Transaction = bincode::deserialize(&bytes).map_err(|e| {
        ProposalError::configuration(format!("verification payload is not a transaction: {}", e))
    })?;
    let message = &transaction.message;

    let compiled = message
        .instructions
        .iter()
        .find(|ix| {
            message.account_keys.get(ix.program_id_index as usize) != Some(&compute_budget::id())
        })
        .ok_or_else(|| {
            ProposalError::configuration("verification payload carries no instruction")
        })?;

    let key = |index: u8| {
        message
            .account_keys
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                ProposalError::configuration("verification payload references a missing account")
            })
    };
    let header = &message.header;
    let signers = header.num_required_signatures as usize;
    let writable_signers = signers.saturating_sub(header.num_readonly_signed_accounts as usize);
    let writable_end = message
        .account_keys
        .len()
        .saturating_sub(header.num_readonly_unsigned_accounts as usize);

    let accounts = compiled
        .accounts
        .iter()
        .map(|&index| {
            let position = index as usize;
            Ok(AccountMeta {
                pubkey: key(index)?,
                is_signer: position < signers,
                is_writable: if position < signers {
                    position < writable_signers
                } else {
                    position < writable_end
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Instruction {
        program_id: key(compiled.program_id_index)?,
        accounts,
        data: compiled.data.clone(),
    })
}
