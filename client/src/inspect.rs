//! Human-readable summaries of what a vault transaction will do.

use anchor_client::solana_sdk::{
    bpf_loader_upgradeable, instruction::Instruction, pubkey::Pubkey,
    system_instruction::SystemInstruction, system_program,
};

use crate::{
    error::Result,
    loader::{self, LoaderInstruction},
    squads::{VaultTransaction, VaultTransactionMessage},
};

pub fn describe_transaction(transaction: &VaultTransaction) -> Result<Vec<String>> {
    let mut lines = vec![format!(
        "Vault transaction #{} (vault {}) created by {}",
        transaction.index, transaction.vault_index, transaction.creator
    )];
    lines.extend(describe_message(&transaction.message)?);
    Ok(lines)
}

pub fn describe_message(message: &VaultTransactionMessage) -> Result<Vec<String>> {
    Ok(message
        .instructions()?
        .iter()
        .enumerate()
        .map(|(position, ix)| format!("{}. {}", position + 1, describe_instruction(ix)))
        .collect())
}

fn account(ix: &Instruction, position: usize) -> String {
    ix.accounts
        .get(position)
        .map(|meta| meta.pubkey.to_string())
        .unwrap_or_else(|| "<missing>".to_string())
}

pub fn describe_instruction(ix: &Instruction) -> String {
    if ix.program_id == bpf_loader_upgradeable::id() {
        return match loader::decode(&ix.data) {
            Ok(LoaderInstruction::Upgrade) => format!(
                "Upgrade program {} from buffer {}, spill to {}",
                account(ix, 1),
                account(ix, 2),
                account(ix, 3)
            ),
            Ok(LoaderInstruction::SetAuthority) => format!(
                "Set authority of buffer {} to {}",
                account(ix, 0),
                account(ix, 2)
            ),
            Ok(LoaderInstruction::ExtendProgram { additional_bytes }) => format!(
                "Extend program {} by {} bytes",
                account(ix, 1),
                additional_bytes
            ),
            Ok(LoaderInstruction::Close) => format!(
                "Close {} and send its lamports to {}",
                account(ix, 0),
                account(ix, 1)
            ),
            Ok(LoaderInstruction::Other(tag)) => {
                format!("Upgradeable loader instruction {}", tag)
            }
            Err(_) => unknown(&ix.program_id, &ix.data),
        };
    }

    if ix.program_id == system_program::id() {
        if let Ok(SystemInstruction::Transfer { lamports }) = bincode::deserialize(&ix.data) {
            return format!(
                "Transfer {} lamports from {} to {}",
                lamports,
                account(ix, 0),
                account(ix, 1)
            );
        }
    }

    if loader::is_idl_set_buffer(&ix.data) {
        return format!(
            "Set IDL {} of program {} from buffer {}",
            account(ix, 1),
            ix.program_id,
            account(ix, 0)
        );
    }

    unknown(&ix.program_id, &ix.data)
}

fn unknown(program: &Pubkey, data: &[u8]) -> String {
    format!(
        "Unknown instruction for program {} ({} bytes of data)",
        program,
        data.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::UpgradeOperation;
    use anchor_client::solana_sdk::system_instruction;

    #[test]
    fn upgrade_names_program_and_buffer() {
        let program = Pubkey::new_unique();
        let buffer = Pubkey::new_unique();
        let ix = UpgradeOperation::Upgrade {
            program,
            buffer,
            spill: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
        }
        .instruction()
        .unwrap();

        let text = describe_instruction(&ix);
        assert!(text.starts_with("Upgrade program"));
        assert!(text.contains(&program.to_string()));
        assert!(text.contains(&buffer.to_string()));
    }

    #[test]
    fn extension_reports_byte_count() {
        let ix = UpgradeOperation::Extend {
            program: Pubkey::new_unique(),
            additional_bytes: 5000,
            payer: None,
        }
        .instruction()
        .unwrap();
        assert!(describe_instruction(&ix).contains("by 5000 bytes"));
    }

    #[test]
    fn transfer_reports_lamports() {
        let ix = system_instruction::transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 42);
        assert!(describe_instruction(&ix).starts_with("Transfer 42 lamports"));
    }

    #[test]
    fn idl_update_is_recognised() {
        let ix = UpgradeOperation::IdlSetBuffer {
            program: Pubkey::new_unique(),
            buffer: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
        }
        .instruction()
        .unwrap();
        assert!(describe_instruction(&ix).starts_with("Set IDL"));
    }

    #[test]
    fn anything_else_is_unknown() {
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[1, 2], vec![]);
        assert!(describe_instruction(&ix).starts_with("Unknown instruction"));
    }
}
