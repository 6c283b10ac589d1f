//! Bet Storage Module
//!
//! This module holds the `Bet` record and the persistence collaborator the
//! connection handler hands parsed bets to.
//!
//! ## Example
//!
//! ```
//! use betrelay::storage::{Bet, BetStore, MemoryBetStore};
//! use chrono::NaiveDate;
//!
//! let store = MemoryBetStore::new();
//! let bet = Bet::new(
//!     "30904465",
//!     "Juan",
//!     "Perez",
//!     1,
//!     42,
//!     NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
//! );
//! store.store(vec![bet]).unwrap();
//! assert_eq!(store.load().unwrap().len(), 1);
//! ```

pub mod bet;
pub mod store;

// Re-export commonly used types
pub use bet::{Bet, LOTTERY_WINNER_NUMBER};
pub use store::{BetStore, FileBetStore, MemoryBetStore, StoreError, DEFAULT_STORAGE_PATH};
