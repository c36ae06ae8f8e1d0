use std::io::ErrorKind;

use anchor_client::{
    solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey},
    Cluster,
};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use crate::squads::SQUADS_PROGRAM_ID;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/vault-upgrade.toml";
pub const DEFAULT_MEMO: &str = "Program and IDL upgrade";

pub fn load<T: DeserializeOwned>(path: &str) -> Result<T> {
    let path = &*shellexpand::tilde(path);
    let conf_str = read_to_string(path)?;
    let config: T = toml::from_str(&conf_str)?;
    Ok(config)
}

/// Same behavior as std::fs::read_to_string, except
/// it tells you the filename when it can't be found
fn read_to_string<P>(path: P) -> std::io::Result<String>
where
    P: AsRef<std::path::Path> + std::fmt::Display + Copy,
{
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            std::io::Error::new(ErrorKind::NotFound, format!("{}: {}", e, path))
        } else {
            e
        }
    })
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct UpgradeConfig {
    pub cluster: String,

    pub wallet: String,

    /// Deployment of the governance program holding the multisig
    #[serde(
        default = "default_program_id",
        with = "serde_with::rust::display_fromstr"
    )]
    pub program_id: Pubkey,

    #[serde(default, with = "optional_display_fromstr")]
    pub multisig: Option<Pubkey>,

    #[serde(default)]
    pub vault_index: u8,

    #[serde(default)]
    pub commitment: CommitmentLevel,

    /// Micro-lamports per compute unit on every transaction this tool sends
    pub compute_unit_price: Option<u64>,

    #[serde(default = "default_memo")]
    pub memo: String,
}

fn default_program_id() -> Pubkey {
    SQUADS_PROGRAM_ID
}

fn default_memo() -> String {
    DEFAULT_MEMO.to_string()
}

impl UpgradeConfig {
    pub fn cluster(&self) -> Cluster {
        match &*self.cluster.to_lowercase() {
            "l" | "localnet" | "localhost" => Cluster::Localnet,
            "d" | "devnet" => Cluster::Devnet,
            "t" | "testnet" => Cluster::Testnet,
            "m" | "mainnet" => Cluster::Mainnet,
            rpc => {
                let wss = rpc.replace("https", "wss");
                Cluster::Custom(rpc.to_owned(), wss)
            }
        }
    }
}

mod optional_display_fromstr {
    use super::Pubkey;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper(#[serde(with = "serde_with::rust::display_fromstr")] Pubkey);

        let helper = Option::deserialize(deserializer)?;
        Ok(helper.map(|Helper(external)| external))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let file = write_config(
            r#"
            cluster = "devnet"
            wallet = "~/.config/solana/id.json"
            "#,
        );
        let config: UpgradeConfig = load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.program_id, SQUADS_PROGRAM_ID);
        assert_eq!(config.multisig, None);
        assert_eq!(config.vault_index, 0);
        assert_eq!(config.compute_unit_price, None);
        assert_eq!(config.memo, DEFAULT_MEMO);
        assert_eq!(config.cluster(), Cluster::Devnet);
    }

    #[test]
    fn full_config_is_read() {
        let multisig = Pubkey::new_unique();
        let file = write_config(&format!(
            r#"
            cluster = "https://rpc.example.org"
            wallet = "/keys/admin.json"
            multisig = "{}"
            vault-index = 2
            commitment = "finalized"
            compute-unit-price = 5000
            memo = "v2 rollout"
            "#,
            multisig
        ));
        let config: UpgradeConfig = load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.multisig, Some(multisig));
        assert_eq!(config.vault_index, 2);
        assert_eq!(config.commitment, CommitmentLevel::Finalized);
        assert_eq!(config.compute_unit_price, Some(5000));
        assert_eq!(config.memo, "v2 rollout");
        assert_eq!(
            config.cluster(),
            Cluster::Custom(
                "https://rpc.example.org".to_string(),
                "wss://rpc.example.org".to_string()
            )
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load::<UpgradeConfig>("/nonexistent/vault-upgrade.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vault-upgrade.toml"));
    }

    #[test]
    fn bad_pubkey_is_rejected() {
        let file = write_config(
            r#"
            cluster = "localnet"
            wallet = "id.json"
            multisig = "not-a-key"
            "#,
        );
        assert!(load::<UpgradeConfig>(file.path().to_str().unwrap()).is_err());
    }
}
