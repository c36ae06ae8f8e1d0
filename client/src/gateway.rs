/// Thin layer between the proposal logic and the cluster it talks to
use std::rc::Rc;

use anchor_client::solana_client::{
    client_error::{ClientError, ClientErrorKind},
    rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
    rpc_request::RpcError,
};
use anchor_client::solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use log::debug;

use crate::error::LedgerError;

pub trait Ledger {
    /// Recent blockhash to anchor a new transaction to.
    fn latest_anchor(&self) -> Result<Hash, LedgerError>;

    fn account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Sends a signed transaction and blocks until it is confirmed.
    fn submit(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;
}

impl<T: Ledger + ?Sized> Ledger for Rc<T> {
    fn latest_anchor(&self) -> Result<Hash, LedgerError> {
        (**self).latest_anchor()
    }

    fn account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        (**self).account(address)
    }

    fn submit(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        (**self).submit(transaction)
    }
}

pub struct RpcLedger {
    pub rpc: RpcClient,
}

impl RpcLedger {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

impl Ledger for RpcLedger {
    fn latest_anchor(&self) -> Result<Hash, LedgerError> {
        self.rpc.get_latest_blockhash().map_err(classify)
    }

    fn account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        Ok(self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .map_err(classify)?
            .value)
    }

    fn submit(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let commitment = self.rpc.commitment();
        let config = RpcSendTransactionConfig {
            preflight_commitment: Some(commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        debug!(
            "sending transaction {} with {} instruction(s)",
            transaction.signatures[0],
            transaction.message.instructions.len()
        );

        self.rpc
            .send_and_confirm_transaction_with_spinner_and_config(transaction, commitment, config)
            .map_err(classify)
    }
}

/// Sorts a client error into the failure kinds the proposal logic acts on.
pub fn classify(err: ClientError) -> LedgerError {
    if let Some(tx_err) = err.get_transaction_error() {
        return classify_transaction_error(tx_err);
    }
    match err.kind() {
        ClientErrorKind::Reqwest(e) if e.is_timeout() => LedgerError::Timeout,
        // the confirmation loop gives up once the blockhash expired without the signature landing
        ClientErrorKind::RpcError(RpcError::ForUser(message))
            if message.contains("unable to confirm transaction") =>
        {
            LedgerError::AnchorExpired
        }
        _ => LedgerError::Network(err.to_string()),
    }
}

pub fn classify_transaction_error(err: TransactionError) -> LedgerError {
    let reason = err.to_string();
    match err {
        TransactionError::BlockhashNotFound => LedgerError::AnchorExpired,
        TransactionError::InstructionError(instruction, InstructionError::Custom(code)) => {
            LedgerError::Simulation {
                reason,
                instruction: Some(instruction),
                code: Some(code),
            }
        }
        TransactionError::InstructionError(instruction, _) => LedgerError::Simulation {
            reason,
            instruction: Some(instruction),
            code: None,
        },
        _ => LedgerError::Simulation {
            reason,
            instruction: None,
            code: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_blockhash_is_an_anchor_error() {
        assert_eq!(
            classify_transaction_error(TransactionError::BlockhashNotFound),
            LedgerError::AnchorExpired
        );
    }

    #[test]
    fn custom_program_errors_keep_their_code() {
        let err = classify_transaction_error(TransactionError::InstructionError(
            1,
            InstructionError::Custom(2006),
        ));
        assert!(matches!(
            err,
            LedgerError::Simulation {
                instruction: Some(1),
                code: Some(2006),
                ..
            }
        ));
    }

    #[test]
    fn unconfirmed_transaction_after_expiry_is_an_anchor_error() {
        let err = ClientError::from(ClientErrorKind::RpcError(RpcError::ForUser(
            "unable to confirm transaction. This can happen in situations such as transaction \
             expiration and insufficient fee-payer funds"
                .to_string(),
        )));
        assert_eq!(classify(err), LedgerError::AnchorExpired);
    }

    #[test]
    fn client_side_failures_are_network_errors() {
        let err = ClientError::from(ClientErrorKind::Custom("connection refused".into()));
        assert!(matches!(classify(err), LedgerError::Network(_)));
    }
}
