use anyhow::{Context, Result};
use clap::Parser;
use cli::{Job, Opts};
use vault_upgrade_client::{
    config::{self, UpgradeConfig},
    envelope::ProposalReceipt,
    gateway::RpcLedger,
    inspect,
    propose::{self, UpgradeRequest},
    service::UpgradeService,
};

mod cli;
mod expanded_path;

fn main() -> Result<()> {
    solana_logger::setup_with_default("solana=info,vault_upgrade_client=info");
    let cli_opts = Opts::parse();
    let upgrade_config: UpgradeConfig = config::load(&cli_opts.config)
        .with_context(|| format!("loading config {}", cli_opts.config))?;
    let wallet = match &cli_opts.keypair {
        Some(path) => path.to_string(),
        None => upgrade_config.wallet.clone(),
    };
    let payer = vault_upgrade_client::load_payer(&wallet)?;
    let service = vault_upgrade_client::load_service(payer, &upgrade_config, cli_opts.multisig)?;
    run_job(cli_opts.job, &service)
}

fn run_job(job: Job, service: &UpgradeService<RpcLedger>) -> Result<()> {
    match job {
        Job::Info => {
            let info = service.vault_info()?;
            println!("multisig = {}", info.multisig);
            println!("vault = {}", info.vault);
            println!("transaction index = {}", info.transaction_index);
            println!("stale transaction index = {}", info.stale_transaction_index);
            println!("threshold = {}", info.threshold);
            println!("time lock = {}s", info.time_lock);
            for member in info.members {
                println!("member {} (permissions {:#05b})", member.key, member.permissions.mask);
            }
        }
        Job::ProposeUpgrade(cmd) => {
            let request = UpgradeRequest {
                program: cmd.program,
                buffer: cmd.buffer,
                idl_buffer: cmd.idl_buffer,
                spill: cmd.spill,
                extend: cmd.extend.unwrap_or_default(),
                verification: cmd.verification,
            };
            if cmd.dry_run {
                let instructions = propose::plan_upgrade(service, &request)?;
                let message = service.preview(&instructions)?;
                for line in inspect::describe_message(&message)? {
                    println!("{}", line);
                }
            } else {
                let receipt = propose::plan_and_submit_upgrade(service, &request)
                    .context("proposing upgrade")?;
                print_receipt(&receipt);
            }
        }
        Job::ProposeCloseBuffer(cmd) => {
            let receipt = propose::propose_close_buffer(service, &cmd.buffer, cmd.recipient)?;
            print_receipt(&receipt);
        }
        Job::ProposeTransfer(cmd) => {
            let receipt = propose::propose_transfer(service, &cmd.recipient, cmd.lamports)?;
            print_receipt(&receipt);
        }
        Job::TransferBufferAuthority(cmd) => {
            let signature = service.transfer_buffer_authority(&cmd.buffer, cmd.new_authority)?;
            println!("{}", signature);
        }
        Job::Inspect(cmd) => {
            for line in service.inspect(cmd.index)? {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn print_receipt(receipt: &ProposalReceipt) {
    println!("transaction index = {}", receipt.transaction_index);
    println!(
        "vault transaction = {} ({})",
        receipt.vault_transaction, receipt.vault_transaction_signature
    );
    println!(
        "proposal = {} ({})",
        receipt.proposal, receipt.proposal_signature
    );
}
