//! Picks the transaction index a new proposal is created under.
//!
//! The counter lives in the multisig account and only the governance program
//! increments it. Two processes can read the same value; the program rejects
//! whichever creates its record second, and the loser must re-read before
//! trying again. Locally, an index handed out once is never handed out again
//! unless its submission definitely failed.

use std::cell::Cell;

use log::debug;

use crate::{
    error::{ProposalError, Result},
    gateway::Ledger,
    squads::SquadsVault,
};

#[derive(Debug, Default)]
pub struct Sequencer {
    last_proposed: Cell<Option<u64>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the counter afresh and reserves the index after it.
    pub fn next_index<L: Ledger + ?Sized>(&self, ledger: &L, vault: &SquadsVault) -> Result<u64> {
        let current = vault.read_state(ledger)?.transaction_index;
        let index = self.reserve(current)?;
        debug!("vault counter at {}, proposing index {}", current, index);
        Ok(index)
    }

    /// Reserves the index after `current`, skipping anything already handed out.
    pub fn reserve(&self, current: u64) -> Result<u64> {
        let floor = self.last_proposed.get().map_or(current, |last| last.max(current));
        let index = floor.checked_add(1).ok_or_else(|| {
            ProposalError::configuration("vault transaction index is exhausted")
        })?;
        self.last_proposed.set(Some(index));
        Ok(index)
    }

    /// Gives back an index whose vault transaction never landed.
    pub fn release(&self, index: u64) {
        if self.last_proposed.get() == Some(index) {
            self.last_proposed.set(index.checked_sub(1).filter(|i| *i > 0));
        }
    }

    /// Forgets every local reservation, so the next index follows the counter
    /// alone. Indices this process landed are all at or below the counter.
    pub fn reset(&self) {
        self.last_proposed.set(None);
    }

    pub fn last_proposed(&self) -> Option<u64> {
        self.last_proposed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_41_proposes_42() {
        assert_eq!(Sequencer::new().reserve(41).unwrap(), 42);
    }

    #[test]
    fn repeated_reads_of_the_same_counter_never_repeat_an_index() {
        let sequencer = Sequencer::new();
        let first = sequencer.reserve(10).unwrap();
        let second = sequencer.reserve(10).unwrap();
        assert_eq!(first, 11);
        assert_eq!(second, 12);
    }

    #[test]
    fn counter_ahead_of_local_reservations_wins() {
        let sequencer = Sequencer::new();
        sequencer.reserve(10).unwrap();
        assert_eq!(sequencer.reserve(20).unwrap(), 21);
    }

    #[test]
    fn released_index_can_be_proposed_again() {
        let sequencer = Sequencer::new();
        let index = sequencer.reserve(10).unwrap();
        sequencer.release(index);
        assert_eq!(sequencer.reserve(10).unwrap(), index);
    }

    #[test]
    fn releasing_an_older_index_keeps_later_reservations() {
        let sequencer = Sequencer::new();
        let first = sequencer.reserve(10).unwrap();
        let second = sequencer.reserve(10).unwrap();
        sequencer.release(first);
        assert_eq!(sequencer.last_proposed(), Some(second));
    }

    #[test]
    fn reset_follows_the_counter_again() {
        let sequencer = Sequencer::new();
        sequencer.reserve(10).unwrap();
        sequencer.reserve(10).unwrap();
        sequencer.reset();
        assert_eq!(sequencer.last_proposed(), None);
        assert_eq!(sequencer.reserve(10).unwrap(), 11);
    }

    #[test]
    fn exhausted_counter_is_a_configuration_error() {
        assert!(matches!(
            Sequencer::new().reserve(u64::MAX),
            Err(ProposalError::Configuration(_))
        ));
    }
}
