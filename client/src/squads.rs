//! Codec for the governance program (Squads v4) that owns the vault.
//!
//! Only the pieces this tool needs: reading the multisig and its stored vault
//! transactions, and building the two instructions that create a proposal.

use anchor_client::solana_sdk::{
    account::Account,
    hash::hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    address,
    error::{ProposalError, Result},
    gateway::Ledger,
};

/// `SQDS4ep65T869zMMBKyuUq6aD6EgTu8psMjkvj52pCf`
pub const SQUADS_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 129, 196, 206, 71, 226, 35, 104, 184, 177, 85, 94, 200, 135, 175, 9, 46, 252, 126, 251,
    182, 108, 163, 245, 47, 191, 104, 212, 172, 156, 183, 168,
]);

/// Anchor `ConstraintSeeds`: the transaction PDA does not match the next index.
pub const ERROR_CONSTRAINT_SEEDS: u32 = 2006;
/// System program `AccountAlreadyInUse`: the transaction PDA already exists.
pub const ERROR_ACCOUNT_IN_USE: u32 = 0;

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    sighash("global", name)
}

pub fn account_discriminator(name: &str) -> [u8; 8] {
    sighash("account", name)
}

fn sighash(namespace: &str, name: &str) -> [u8; 8] {
    let preimage = format!("{}:{}", namespace, name);

    let mut result = [0u8; 8];
    result.copy_from_slice(&hash(preimage.as_bytes()).to_bytes()[..8]);
    result
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Multisig {
    pub create_key: Pubkey,
    pub config_authority: Pubkey,
    pub threshold: u16,
    pub time_lock: u32,
    pub transaction_index: u64,
    pub stale_transaction_index: u64,
    pub rent_collector: Option<Pubkey>,
    pub bump: u8,
    pub members: Vec<Member>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub key: Pubkey,
    pub permissions: Permissions,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub mask: u8,
}

impl Permissions {
    pub const INITIATE: u8 = 1 << 0;
    pub const VOTE: u8 = 1 << 1;
    pub const EXECUTE: u8 = 1 << 2;

    pub fn has(&self, permission: u8) -> bool {
        self.mask & permission == permission
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultTransaction {
    pub multisig: Pubkey,
    pub creator: Pubkey,
    pub index: u64,
    pub bump: u8,
    pub vault_index: u8,
    pub vault_bump: u8,
    pub ephemeral_signer_bumps: Vec<u8>,
    pub message: VaultTransactionMessage,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultTransactionMessage {
    pub num_signers: u8,
    pub num_writable_signers: u8,
    pub num_writable_non_signers: u8,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<AddressTableLookup>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indexes: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct AddressTableLookup {
    pub account_key: Pubkey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

impl VaultTransactionMessage {
    pub fn is_signer(&self, index: usize) -> bool {
        index < self.num_signers as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        if self.is_signer(index) {
            index < self.num_writable_signers as usize
        } else {
            index - (self.num_signers as usize) < self.num_writable_non_signers as usize
        }
    }

    /// Rebuilds the instructions in their original, uncompiled form.
    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        let key = |index: u8| {
            self.account_keys
                .get(index as usize)
                .copied()
                .ok_or_else(|| {
                    ProposalError::configuration(format!("account index {} out of range", index))
                })
        };
        self.instructions
            .iter()
            .map(|compiled| {
                let accounts = compiled
                    .account_indexes
                    .iter()
                    .map(|&index| {
                        Ok(AccountMeta {
                            pubkey: key(index)?,
                            is_signer: self.is_signer(index as usize),
                            is_writable: self.is_writable(index as usize),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Instruction {
                    program_id: key(compiled.program_id_index)?,
                    accounts,
                    data: compiled.data.clone(),
                })
            })
            .collect()
    }

    /// The compact wire form the program takes as `transaction_message`:
    /// `u8` length prefixes everywhere except instruction data, which uses `u16`.
    pub fn to_compact_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![
            self.num_signers,
            self.num_writable_signers,
            self.num_writable_non_signers,
        ];
        write_len_u8(&mut out, self.account_keys.len(), "account keys")?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_ref());
        }
        write_len_u8(&mut out, self.instructions.len(), "instructions")?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            write_len_u8(&mut out, ix.account_indexes.len(), "instruction accounts")?;
            out.extend_from_slice(&ix.account_indexes);
            let data_len = u16::try_from(ix.data.len()).map_err(|_| {
                ProposalError::configuration("instruction data longer than 65535 bytes")
            })?;
            out.extend_from_slice(&data_len.to_le_bytes());
            out.extend_from_slice(&ix.data);
        }
        write_len_u8(&mut out, self.address_table_lookups.len(), "lookup tables")?;
        for lookup in &self.address_table_lookups {
            out.extend_from_slice(lookup.account_key.as_ref());
            write_len_u8(&mut out, lookup.writable_indexes.len(), "writable indexes")?;
            out.extend_from_slice(&lookup.writable_indexes);
            write_len_u8(&mut out, lookup.readonly_indexes.len(), "readonly indexes")?;
            out.extend_from_slice(&lookup.readonly_indexes);
        }
        Ok(out)
    }

    pub fn from_compact_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = CompactReader { bytes };
        let num_signers = reader.u8()?;
        let num_writable_signers = reader.u8()?;
        let num_writable_non_signers = reader.u8()?;

        let key_count = reader.u8()?;
        let account_keys = (0..key_count)
            .map(|_| reader.pubkey())
            .collect::<Result<Vec<_>>>()?;

        let ix_count = reader.u8()?;
        let mut instructions = Vec::with_capacity(ix_count as usize);
        for _ in 0..ix_count {
            let program_id_index = reader.u8()?;
            let account_count = reader.u8()? as usize;
            let account_indexes = reader.take(account_count)?.to_vec();
            let data_len = u16::from_le_bytes([reader.u8()?, reader.u8()?]) as usize;
            let data = reader.take(data_len)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                account_indexes,
                data,
            });
        }

        let lookup_count = reader.u8()?;
        let mut address_table_lookups = Vec::with_capacity(lookup_count as usize);
        for _ in 0..lookup_count {
            let account_key = reader.pubkey()?;
            let writable = reader.u8()? as usize;
            let writable_indexes = reader.take(writable)?.to_vec();
            let readonly = reader.u8()? as usize;
            let readonly_indexes = reader.take(readonly)?.to_vec();
            address_table_lookups.push(AddressTableLookup {
                account_key,
                writable_indexes,
                readonly_indexes,
            });
        }

        Ok(Self {
            num_signers,
            num_writable_signers,
            num_writable_non_signers,
            account_keys,
            instructions,
            address_table_lookups,
        })
    }
}

fn write_len_u8(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = u8::try_from(len)
        .map_err(|_| ProposalError::configuration(format!("too many {} for one message", what)))?;
    out.push(len);
    Ok(())
}

struct CompactReader<'a> {
    bytes: &'a [u8],
}

impl<'a> CompactReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(ProposalError::configuration(
                "truncated vault transaction message",
            ));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn pubkey(&mut self) -> Result<Pubkey> {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.take(32)?);
        Ok(Pubkey::new_from_array(key))
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultTransactionCreateArgs {
    pub vault_index: u8,
    pub ephemeral_signers: u8,
    pub transaction_message: Vec<u8>,
    pub memo: Option<String>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProposalCreateArgs {
    pub transaction_index: u64,
    pub draft: bool,
}

fn instruction_data<T: BorshSerialize>(name: &str, args: &T) -> Result<Vec<u8>> {
    let mut data = instruction_discriminator(name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| ProposalError::configuration(format!("cannot encode {}: {}", name, e)))?;
    Ok(data)
}

/// Decodes an Anchor account after checking its discriminator.
pub fn decode_account<T: BorshDeserialize>(name: &str, data: &[u8]) -> Result<T> {
    if data.len() < 8 || data[..8] != account_discriminator(name) {
        return Err(ProposalError::configuration(format!(
            "account is not a {}",
            name
        )));
    }
    T::deserialize(&mut &data[8..])
        .map_err(|e| ProposalError::configuration(format!("cannot decode {}: {}", name, e)))
}

/// Encodes an Anchor account with its discriminator.
pub fn encode_account<T: BorshSerialize>(name: &str, account: &T) -> Result<Vec<u8>> {
    let mut data = account_discriminator(name).to_vec();
    account
        .serialize(&mut data)
        .map_err(|e| ProposalError::configuration(format!("cannot encode {}: {}", name, e)))?;
    Ok(data)
}

/// One vault of one multisig under one deployment of the governance program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquadsVault {
    pub program_id: Pubkey,
    pub multisig: Pubkey,
    pub vault_index: u8,
}

impl SquadsVault {
    pub fn new(program_id: Pubkey, multisig: Pubkey, vault_index: u8) -> Self {
        Self {
            program_id,
            multisig,
            vault_index,
        }
    }

    pub fn authority(&self) -> Result<Pubkey> {
        Ok(address::vault_address(&self.program_id, &self.multisig, self.vault_index)?.0)
    }

    pub fn transaction(&self, index: u64) -> Result<Pubkey> {
        Ok(address::transaction_address(&self.program_id, &self.multisig, index)?.0)
    }

    pub fn proposal(&self, index: u64) -> Result<Pubkey> {
        Ok(address::proposal_address(&self.program_id, &self.multisig, index)?.0)
    }

    fn owned_account<L: Ledger + ?Sized>(&self, ledger: &L, address: &Pubkey) -> Result<Account> {
        let account = ledger
            .account(address)?
            .ok_or_else(|| ProposalError::configuration(format!("account {} not found", address)))?;
        if account.owner != self.program_id {
            return Err(ProposalError::configuration(format!(
                "account {} is owned by {}, expected {}",
                address, account.owner, self.program_id
            )));
        }
        Ok(account)
    }

    pub fn read_state<L: Ledger + ?Sized>(&self, ledger: &L) -> Result<Multisig> {
        let account = self.owned_account(ledger, &self.multisig)?;
        decode_account("Multisig", &account.data)
    }

    pub fn read_transaction<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        index: u64,
    ) -> Result<VaultTransaction> {
        let account = self.owned_account(ledger, &self.transaction(index)?)?;
        decode_account("VaultTransaction", &account.data)
    }

    pub fn vault_transaction_create(
        &self,
        index: u64,
        creator: &Pubkey,
        rent_payer: &Pubkey,
        transaction_message: Vec<u8>,
        memo: Option<String>,
    ) -> Result<Instruction> {
        let args = VaultTransactionCreateArgs {
            vault_index: self.vault_index,
            ephemeral_signers: 0,
            transaction_message,
            memo,
        };
        Ok(Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.multisig, false),
                AccountMeta::new(self.transaction(index)?, false),
                AccountMeta::new_readonly(*creator, true),
                AccountMeta::new(*rent_payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
            data: instruction_data("vault_transaction_create", &args)?,
        })
    }

    pub fn proposal_create(
        &self,
        index: u64,
        creator: &Pubkey,
        rent_payer: &Pubkey,
    ) -> Result<Instruction> {
        let args = ProposalCreateArgs {
            transaction_index: index,
            draft: false,
        };
        Ok(Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(self.multisig, false),
                AccountMeta::new(self.proposal(index)?, false),
                AccountMeta::new_readonly(*creator, true),
                AccountMeta::new(*rent_payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
            data: instruction_data("proposal_create", &args)?,
        })
    }
}
