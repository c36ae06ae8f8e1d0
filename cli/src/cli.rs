use anchor_client::solana_sdk::pubkey::Pubkey;
use clap::{Args, Parser, Subcommand};
use vault_upgrade_client::{config::DEFAULT_CONFIG_PATH, propose::ExtendPolicy};

use crate::expanded_path::ExpandedPath;

#[derive(Parser)]
#[command(version, about = "Propose program upgrades to a Squads vault")]
pub struct Opts {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Keypair paying for and creating proposals, instead of the configured wallet
    #[arg(short, long)]
    pub keypair: Option<ExpandedPath>,

    /// Multisig to propose to, instead of the configured one
    #[arg(short, long)]
    pub multisig: Option<Pubkey>,

    #[command(subcommand)]
    pub job: Job,
}

#[derive(Subcommand)]
pub enum Job {
    /// Show the vault address, transaction index and members
    Info,
    ProposeUpgrade(ProposeUpgrade),
    ProposeCloseBuffer(ProposeCloseBuffer),
    ProposeTransfer(ProposeTransfer),
    TransferBufferAuthority(TransferBufferAuthority),
    /// Describe the vault transaction stored at an index
    Inspect(Inspect),
}

/// Propose upgrading a program (and optionally its IDL) from buffers the vault controls
#[derive(Args, Debug)]
pub struct ProposeUpgrade {
    pub program: Pubkey,
    pub buffer: Pubkey,

    #[arg(long)]
    pub idl_buffer: Option<Pubkey>,

    /// Receives the buffer's lamports after the upgrade
    #[arg(long)]
    pub spill: Option<Pubkey>,

    /// Grow the program data first: a byte count, or "auto"
    #[arg(long, value_parser = parse_extend)]
    pub extend: Option<ExtendPolicy>,

    /// Base64 transaction carrying a verification instruction to run first
    #[arg(long)]
    pub verification: Option<String>,

    /// Print the batch without proposing it
    #[arg(long)]
    pub dry_run: bool,
}

/// Propose closing a buffer owned by the vault
#[derive(Args, Debug)]
pub struct ProposeCloseBuffer {
    pub buffer: Pubkey,

    /// Receives the buffer's lamports, the vault by default
    #[arg(long)]
    pub recipient: Option<Pubkey>,
}

/// Propose sending lamports out of the vault
#[derive(Args, Debug)]
pub struct ProposeTransfer {
    pub recipient: Pubkey,
    pub lamports: u64,
}

/// Hand a buffer the local keypair controls over to the vault
#[derive(Args, Debug)]
pub struct TransferBufferAuthority {
    pub buffer: Pubkey,

    #[arg(long)]
    pub new_authority: Option<Pubkey>,
}

#[derive(Args, Debug)]
pub struct Inspect {
    pub index: u64,
}

fn parse_extend(value: &str) -> Result<ExtendPolicy, String> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(ExtendPolicy::Auto);
    }
    value
        .parse::<u32>()
        .map(ExtendPolicy::Bytes)
        .map_err(|e| format!("expected a byte count or \"auto\": {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Opts::command().debug_assert();
    }

    #[test]
    fn extend_accepts_bytes_or_auto() {
        assert_eq!(parse_extend("5000").unwrap(), ExtendPolicy::Bytes(5000));
        assert_eq!(parse_extend("AUTO").unwrap(), ExtendPolicy::Auto);
        assert!(parse_extend("lots").is_err());
    }

    #[test]
    fn upgrade_flags_parse() {
        let program = Pubkey::new_unique();
        let buffer = Pubkey::new_unique();
        let opts = Opts::try_parse_from([
            "vault-upgrade".to_string(),
            "propose-upgrade".to_string(),
            program.to_string(),
            buffer.to_string(),
            "--extend".to_string(),
            "auto".to_string(),
            "--dry-run".to_string(),
        ])
        .unwrap();

        match opts.job {
            Job::ProposeUpgrade(cmd) => {
                assert_eq!(cmd.program, program);
                assert_eq!(cmd.buffer, buffer);
                assert_eq!(cmd.extend, Some(ExtendPolicy::Auto));
                assert!(cmd.dry_run);
            }
            _ => panic!("wrong subcommand"),
        }
        assert_eq!(opts.config, DEFAULT_CONFIG_PATH);
    }
}
