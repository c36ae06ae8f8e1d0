pub mod address;
pub mod batch;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod inspect;
pub mod loader;
pub mod propose;
pub mod sequencer;
pub mod service;
pub mod squads;

use std::rc::Rc;

use anchor_client::{
    solana_client::rpc_client::RpcClient,
    solana_sdk::{
        commitment_config::CommitmentConfig, pubkey::Pubkey, signature::read_keypair_file,
        signer::Signer,
    },
};
use anyhow::{anyhow, Result};

use config::UpgradeConfig;
use gateway::RpcLedger;
use service::UpgradeService;
use squads::SquadsVault;

pub fn load_payer(path: &str) -> Result<Rc<dyn Signer>> {
    let path = &*shellexpand::tilde(path);
    let keypair =
        read_keypair_file(path).map_err(|e| anyhow!("error reading keypair file {}: {}", path, e))?;
    Ok(Rc::new(keypair))
}

pub fn load_service(
    payer: Rc<dyn Signer>,
    config: &UpgradeConfig,
    multisig: Option<Pubkey>,
) -> Result<UpgradeService<RpcLedger>> {
    let multisig = multisig
        .or(config.multisig)
        .ok_or_else(|| anyhow!("no multisig given on the command line or in the config"))?;
    let rpc = RpcClient::new_with_commitment(
        config.cluster().url().to_string(),
        CommitmentConfig {
            commitment: config.commitment,
        },
    );
    let vault = SquadsVault::new(config.program_id, multisig, config.vault_index);

    Ok(UpgradeService::new(RpcLedger::new(rpc), payer, vault)
        .with_memo(Some(config.memo.clone()))
        .with_compute_unit_price(config.compute_unit_price))
}
