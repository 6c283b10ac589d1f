//! Lottery Draw
//!
//! Agencies submit their bets and then ask for their winners. The draw
//! happens once, after every configured agency has asked at least once:
//!
//! ```text
//!  winners query ──> not drawn yet? ──> record agency as waiting, "No winners yet"
//!                          │
//!                          └─ drawn ──> that agency's winning document ids
//!
//!  after each connection: all agencies waiting? ──> load bets, draw (once)
//! ```

use crate::protocol::Reply;
use crate::storage::{BetStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct DrawState {
    waiting: HashSet<u32>,
    /// Winning document ids per agency, set by the draw
    winners: Option<HashMap<u32, Vec<String>>>,
}

/// Tracks waiting agencies and the outcome of the draw.
#[derive(Debug)]
pub struct Lottery {
    agencies: usize,
    state: Mutex<DrawState>,
}

impl Lottery {
    /// Creates a lottery that draws once `agencies` distinct agencies wait.
    pub fn new(agencies: usize) -> Self {
        Self {
            agencies,
            state: Mutex::new(DrawState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DrawState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answers a winners query from `agency`.
    pub fn winners_for(&self, agency: u32) -> Reply {
        let mut guard = self.state();
        let state = &mut *guard;
        match &state.winners {
            Some(winners) => {
                let documents = winners.get(&agency).cloned().unwrap_or_default();
                info!(agency, count = documents.len(), "Sending winners to agency");
                Reply::Winners(documents)
            }
            None => {
                state.waiting.insert(agency);
                debug!(
                    agency,
                    waiting = state.waiting.len(),
                    expected = self.agencies,
                    "Agency waiting for draw"
                );
                Reply::NoWinnersYet
            }
        }
    }

    /// Runs the draw if every agency is waiting and it has not run yet.
    ///
    /// Returns true if this call performed the draw.
    pub fn try_draw(&self, store: &dyn BetStore) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.winners.is_some() || state.waiting.len() < self.agencies {
            return Ok(false);
        }

        let mut winners: HashMap<u32, Vec<String>> = HashMap::new();
        for bet in store.load()?.into_iter().filter(|bet| bet.has_won()) {
            winners
                .entry(bet.agency())
                .or_default()
                .push(bet.document_id().to_string());
        }

        let total: usize = winners.values().map(Vec::len).sum();
        info!(winners = total, "Lottery draw completed");
        state.winners = Some(winners);
        Ok(true)
    }

    /// Returns true once the draw has happened.
    pub fn is_drawn(&self) -> bool {
        self.state().winners.is_some()
    }
}
