use anchor_client::solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

/// Failures reported by the transport that carries signed transactions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("transaction rejected: {reason}")]
    Simulation {
        reason: String,
        /// Position of the failing instruction inside the submitted transaction
        instruction: Option<u8>,
        /// Program-specific error code, when the program returned one
        code: Option<u32>,
    },

    #[error("timed out waiting for confirmation")]
    Timeout,

    #[error("recent blockhash expired before the transaction landed")]
    AnchorExpired,
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transaction index {index} was taken by another proposal, re-read the vault and retry")]
    StaleIndex { index: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(
        "vault transaction {vault_transaction} (index {index}, signature {signature}) was created \
         but creating its proposal failed: {source}. Create the proposal for index {index} manually"
    )]
    PartialSubmission {
        index: u64,
        vault_transaction: Pubkey,
        signature: Signature,
        #[source]
        source: Box<ProposalError>,
    },

    #[error(
        "creating vault transaction {vault_transaction} at index {index} failed: {source}. \
         Check whether that account exists before proposing again"
    )]
    VaultTransaction {
        index: u64,
        vault_transaction: Pubkey,
        #[source]
        source: Box<ProposalError>,
    },

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ProposalError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True when the failure may have left the transaction index consumed on chain.
    pub fn may_have_consumed_index(&self) -> bool {
        match self {
            Self::StaleIndex { .. }
            | Self::PartialSubmission { .. }
            | Self::Ledger(LedgerError::Timeout) => true,
            Self::VaultTransaction { source, .. } => source.may_have_consumed_index(),
            _ => false,
        }
    }
}

pub type Result<T, E = ProposalError> = std::result::Result<T, E>;
