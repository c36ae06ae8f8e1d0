//! An in-memory ledger that applies the governance program's index rule:
//! a vault transaction is only accepted at `transaction_index + 1`.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use anchor_client::solana_sdk::{
    account::Account,
    bpf_loader_upgradeable::{self, UpgradeableLoaderState},
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use borsh::BorshDeserialize;
use vault_upgrade_client::{
    error::LedgerError,
    gateway::Ledger,
    service::UpgradeService,
    squads::{
        account_discriminator, decode_account, encode_account, instruction_discriminator,
        Member, Multisig, Permissions, ProposalCreateArgs, SquadsVault, VaultTransaction,
        VaultTransactionCreateArgs, VaultTransactionMessage, ERROR_CONSTRAINT_SEEDS,
        SQUADS_PROGRAM_ID,
    },
};

#[derive(Default)]
pub struct FakeLedger {
    pub accounts: RefCell<HashMap<Pubkey, Account>>,
    /// Every transaction handed to `submit`, accepted or not
    pub submitted: RefCell<Vec<Transaction>>,
    failures: RefCell<HashMap<usize, LedgerError>>,
    /// Vault transactions another proposer lands just ahead of ours
    front_runs: Cell<u32>,
}

impl FakeLedger {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Makes the `n`th call to `submit` (counting from zero) fail with `err`.
    pub fn fail_on(&self, n: usize, err: LedgerError) {
        self.failures.borrow_mut().insert(n, err);
    }

    pub fn front_run(&self, times: u32) {
        self.front_runs.set(times);
    }

    pub fn put(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        self.accounts.borrow_mut().insert(
            address,
            Account {
                lamports: 1_000_000,
                data,
                owner,
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    pub fn exists(&self, address: &Pubkey) -> bool {
        self.accounts.borrow().contains_key(address)
    }

    pub fn install_multisig(&self, vault: &SquadsVault, transaction_index: u64, member: Pubkey) {
        let state = Multisig {
            create_key: Pubkey::new_unique(),
            config_authority: Pubkey::default(),
            threshold: 1,
            time_lock: 0,
            transaction_index,
            stale_transaction_index: 0,
            rent_collector: None,
            bump: 255,
            members: vec![Member {
                key: member,
                permissions: Permissions {
                    mask: Permissions::INITIATE | Permissions::VOTE | Permissions::EXECUTE,
                },
            }],
        };
        self.put(
            vault.multisig,
            vault.program_id,
            encode_account("Multisig", &state).unwrap(),
        );
    }

    pub fn transaction_index(&self, vault: &SquadsVault) -> u64 {
        self.multisig(&vault.multisig).transaction_index
    }

    pub fn install_program(&self, program: Pubkey, authority: Pubkey, code_len: usize) {
        let (program_data, _) =
            Pubkey::find_program_address(&[program.as_ref()], &bpf_loader_upgradeable::id());
        self.put(
            program,
            bpf_loader_upgradeable::id(),
            bincode::serialize(&UpgradeableLoaderState::Program {
                programdata_address: program_data,
            })
            .unwrap(),
        );
        let mut data = bincode::serialize(&UpgradeableLoaderState::ProgramData {
            slot: 0,
            upgrade_authority_address: Some(authority),
        })
        .unwrap();
        data.resize(UpgradeableLoaderState::size_of_programdata_metadata() + code_len, 0);
        self.put(program_data, bpf_loader_upgradeable::id(), data);
    }

    pub fn install_buffer(&self, buffer: Pubkey, authority: Pubkey, code_len: usize) {
        let mut data = bincode::serialize(&UpgradeableLoaderState::Buffer {
            authority_address: Some(authority),
        })
        .unwrap();
        data.resize(UpgradeableLoaderState::size_of_buffer_metadata() + code_len, 0);
        self.put(buffer, bpf_loader_upgradeable::id(), data);
    }

    fn multisig(&self, address: &Pubkey) -> Multisig {
        let accounts = self.accounts.borrow();
        decode_account("Multisig", &accounts[address].data).unwrap()
    }

    fn store_multisig(&self, address: &Pubkey, state: &Multisig) {
        let data = encode_account("Multisig", state).unwrap();
        self.accounts
            .borrow_mut()
            .get_mut(address)
            .unwrap()
            .data = data;
    }

    fn governance(&self, position: u8, ix: &Instruction) -> Result<(), LedgerError> {
        let rejected = |code: u32| LedgerError::Simulation {
            reason: format!("custom program error: {:#x}", code),
            instruction: Some(position),
            code: Some(code),
        };
        let multisig = ix.accounts[0].pubkey;
        let (discriminator, args) = ix.data.split_at(8);

        if discriminator == instruction_discriminator("vault_transaction_create") {
            let mut state = self.multisig(&multisig);
            if self.front_runs.get() > 0 {
                self.front_runs.set(self.front_runs.get() - 1);
                state.transaction_index += 1;
                self.store_multisig(&multisig, &state);
            }
            let args = VaultTransactionCreateArgs::try_from_slice(args).unwrap();
            let index = state.transaction_index + 1;
            let vault = SquadsVault::new(ix.program_id, multisig, args.vault_index);
            if ix.accounts[1].pubkey != vault.transaction(index).unwrap() {
                return Err(rejected(ERROR_CONSTRAINT_SEEDS));
            }
            let record = VaultTransaction {
                multisig,
                creator: ix.accounts[2].pubkey,
                index,
                bump: 255,
                vault_index: args.vault_index,
                vault_bump: 255,
                ephemeral_signer_bumps: Vec::new(),
                message: VaultTransactionMessage::from_compact_bytes(&args.transaction_message)
                    .unwrap(),
            };
            self.put(
                ix.accounts[1].pubkey,
                ix.program_id,
                encode_account("VaultTransaction", &record).unwrap(),
            );
            state.transaction_index = index;
            self.store_multisig(&multisig, &state);
        } else if discriminator == instruction_discriminator("proposal_create") {
            let args = ProposalCreateArgs::try_from_slice(args).unwrap();
            let vault = SquadsVault::new(ix.program_id, multisig, 0);
            if !self.exists(&vault.transaction(args.transaction_index).unwrap())
                || ix.accounts[1].pubkey != vault.proposal(args.transaction_index).unwrap()
            {
                return Err(rejected(ERROR_CONSTRAINT_SEEDS));
            }
            let mut data = account_discriminator("Proposal").to_vec();
            data.extend_from_slice(&args.transaction_index.to_le_bytes());
            self.put(ix.accounts[1].pubkey, ix.program_id, data);
        }
        Ok(())
    }
}

impl Ledger for FakeLedger {
    fn latest_anchor(&self) -> Result<Hash, LedgerError> {
        Ok(Hash::new_unique())
    }

    fn account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.borrow().get(address).cloned())
    }

    fn submit(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let n = self.submitted.borrow().len();
        self.submitted.borrow_mut().push(transaction.clone());
        if let Some(err) = self.failures.borrow_mut().remove(&n) {
            return Err(err);
        }

        let message = &transaction.message;
        for (position, compiled) in message.instructions.iter().enumerate() {
            let program_id = message.account_keys[compiled.program_id_index as usize];
            if program_id != SQUADS_PROGRAM_ID {
                continue;
            }
            let ix = Instruction {
                program_id,
                accounts: compiled
                    .accounts
                    .iter()
                    .map(|&i| anchor_client::solana_sdk::instruction::AccountMeta {
                        pubkey: message.account_keys[i as usize],
                        is_signer: message.is_signer(i as usize),
                        is_writable: message.is_writable(i as usize),
                    })
                    .collect(),
                data: compiled.data.clone(),
            };
            self.governance(position as u8, &ix)?;
        }
        Ok(transaction.signatures[0])
    }
}

pub struct Fixture {
    pub ledger: Rc<FakeLedger>,
    pub payer: Rc<Keypair>,
    pub vault: SquadsVault,
}

impl Fixture {
    /// A multisig whose counter stands at `transaction_index`.
    pub fn new(transaction_index: u64) -> Self {
        let ledger = FakeLedger::new();
        let payer = Rc::new(Keypair::new());
        let vault = SquadsVault::new(SQUADS_PROGRAM_ID, Pubkey::new_unique(), 0);
        ledger.install_multisig(&vault, transaction_index, payer.pubkey());
        Self {
            ledger,
            payer,
            vault,
        }
    }

    pub fn service(&self) -> UpgradeService<Rc<FakeLedger>> {
        UpgradeService::new(self.ledger.clone(), self.payer.clone(), self.vault)
    }

    pub fn vault_authority(&self) -> Pubkey {
        self.vault.authority().unwrap()
    }
}
