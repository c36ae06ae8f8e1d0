//! Upgradeable-loader instructions that a vault proposes on a program's behalf.
//!
//! Payloads are fixed width and little endian. Account order follows the
//! loader's ABI and is never permuted. Nothing here checks that the accounts
//! exist; the network reports that when the batch executes.

use anchor_client::solana_sdk::{
    bpf_loader_upgradeable,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

use crate::{
    address,
    error::{ProposalError, Result},
};

const UPGRADE: u32 = 3;
const SET_BUFFER_AUTHORITY: u32 = 4;
const CLOSE: u32 = 5;
const EXTEND_PROGRAM: u32 = 10;

/// Anchor's `IdlInstruction::SetBuffer`: the IDL tag followed by the variant index.
pub const IDL_SET_BUFFER: [u8; 9] = [0x40, 0xf4, 0xbc, 0x78, 0xa7, 0xe9, 0x69, 0x0a, 0x03];

/// A fixed account prefix followed by a tail that is either present in full or absent.
#[derive(Debug, Default)]
pub struct AccountList {
    required: Vec<AccountMeta>,
    tail: Vec<AccountMeta>,
}

impl AccountList {
    pub fn required(accounts: Vec<AccountMeta>) -> Self {
        Self {
            required: accounts,
            tail: Vec::new(),
        }
    }

    pub fn optional_tail(self, tail: Option<Vec<AccountMeta>>) -> Self {
        Self {
            tail: tail.unwrap_or_default(),
            ..self
        }
    }

    pub fn into_metas(self) -> Vec<AccountMeta> {
        self.required.into_iter().chain(self.tail).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOperation {
    /// Hand a pending buffer to a new authority (usually the vault).
    SetBufferAuthority {
        buffer: Pubkey,
        current_authority: Pubkey,
        new_authority: Pubkey,
    },
    /// Replace the deployed code with the buffer contents. The buffer's
    /// lamports go to `spill`.
    Upgrade {
        program: Pubkey,
        buffer: Pubkey,
        spill: Pubkey,
        authority: Pubkey,
    },
    /// Grow the program-data account. `payer` funds the extra rent; without
    /// one the account must already hold enough lamports.
    Extend {
        program: Pubkey,
        additional_bytes: u32,
        payer: Option<Pubkey>,
    },
    /// Close an unused buffer and reclaim its lamports.
    CloseBuffer {
        buffer: Pubkey,
        recipient: Pubkey,
        authority: Pubkey,
    },
    /// Point the program's IDL account at a freshly written IDL buffer.
    IdlSetBuffer {
        program: Pubkey,
        buffer: Pubkey,
        authority: Pubkey,
    },
}

impl UpgradeOperation {
    pub fn program_id(&self) -> Pubkey {
        match self {
            Self::IdlSetBuffer { program, .. } => *program,
            _ => bpf_loader_upgradeable::id(),
        }
    }

    pub fn data(&self) -> Vec<u8> {
        match self {
            Self::SetBufferAuthority { .. } => SET_BUFFER_AUTHORITY.to_le_bytes().to_vec(),
            Self::Upgrade { .. } => UPGRADE.to_le_bytes().to_vec(),
            Self::CloseBuffer { .. } => CLOSE.to_le_bytes().to_vec(),
            Self::Extend {
                additional_bytes, ..
            } => {
                let mut data = Vec::with_capacity(8);
                data.extend_from_slice(&EXTEND_PROGRAM.to_le_bytes());
                data.extend_from_slice(&additional_bytes.to_le_bytes());
                data
            }
            Self::IdlSetBuffer { .. } => IDL_SET_BUFFER.to_vec(),
        }
    }

    pub fn accounts(&self) -> Result<Vec<AccountMeta>> {
        let list = match self {
            Self::SetBufferAuthority {
                buffer,
                current_authority,
                new_authority,
            } => AccountList::required(vec![
                AccountMeta::new(*buffer, false),
                AccountMeta::new_readonly(*current_authority, true),
                AccountMeta::new_readonly(*new_authority, false),
            ]),
            Self::Upgrade {
                program,
                buffer,
                spill,
                authority,
            } => {
                let (program_data, _) = address::program_data_address(program)?;
                AccountList::required(vec![
                    AccountMeta::new(program_data, false),
                    AccountMeta::new(*program, false),
                    AccountMeta::new(*buffer, false),
                    AccountMeta::new(*spill, false),
                    AccountMeta::new_readonly(sysvar::rent::id(), false),
                    AccountMeta::new_readonly(sysvar::clock::id(), false),
                    AccountMeta::new_readonly(*authority, true),
                ])
            }
            Self::Extend { program, payer, .. } => {
                let (program_data, _) = address::program_data_address(program)?;
                AccountList::required(vec![
                    AccountMeta::new(program_data, false),
                    AccountMeta::new(*program, false),
                ])
                .optional_tail(payer.map(|payer| {
                    vec![
                        AccountMeta::new_readonly(system_program::id(), false),
                        AccountMeta::new(payer, true),
                    ]
                }))
            }
            Self::CloseBuffer {
                buffer,
                recipient,
                authority,
            } => AccountList::required(vec![
                AccountMeta::new(*buffer, false),
                AccountMeta::new(*recipient, false),
                AccountMeta::new_readonly(*authority, true),
            ]),
            Self::IdlSetBuffer {
                program,
                buffer,
                authority,
            } => AccountList::required(vec![
                AccountMeta::new(*buffer, false),
                AccountMeta::new(address::idl_address(program)?, false),
                AccountMeta::new(*authority, true),
            ]),
        };
        Ok(list.into_metas())
    }

    pub fn instruction(&self) -> Result<Instruction> {
        Ok(Instruction {
            program_id: self.program_id(),
            accounts: self.accounts()?,
            data: self.data(),
        })
    }
}

/// A loader payload read back from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderInstruction {
    Upgrade,
    SetAuthority,
    Close,
    ExtendProgram { additional_bytes: u32 },
    Other(u32),
}

pub fn decode(data: &[u8]) -> Result<LoaderInstruction> {
    let word = |offset: usize| -> Result<u32> {
        data.get(offset..offset + 4)
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .ok_or_else(|| {
                ProposalError::configuration(format!(
                    "loader payload of {} bytes is truncated",
                    data.len()
                ))
            })
    };
    Ok(match word(0)? {
        UPGRADE => LoaderInstruction::Upgrade,
        SET_BUFFER_AUTHORITY => LoaderInstruction::SetAuthority,
        CLOSE => LoaderInstruction::Close,
        EXTEND_PROGRAM => LoaderInstruction::ExtendProgram {
            additional_bytes: word(4)?,
        },
        other => LoaderInstruction::Other(other),
    })
}

pub fn is_idl_set_buffer(data: &[u8]) -> bool {
    data == IDL_SET_BUFFER
}
