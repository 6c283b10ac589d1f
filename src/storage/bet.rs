//! The Bet Record
//!
//! A `Bet` is a single lottery wager. Fields are kept in the canonical
//! storage order, which differs from the order they travel in on the wire
//! (see [`crate::protocol::parser`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The number drawn by the simulated lottery.
pub const LOTTERY_WINNER_NUMBER: u32 = 7574;

/// An immutable lottery bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// National ID of the bettor (digits, variable length)
    document_id: String,
    first_name: String,
    last_name: String,
    /// Agency that collected the bet
    agency: u32,
    /// The wagered number
    bet_number: u32,
    birth_date: NaiveDate,
}

impl Bet {
    /// Creates a bet from its canonical fields.
    pub fn new(
        document_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        agency: u32,
        bet_number: u32,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            agency,
            bet_number,
            birth_date,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn agency(&self) -> u32 {
        self.agency
    }

    pub fn bet_number(&self) -> u32 {
        self.bet_number
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    /// Returns true if this bet matches the winning number.
    #[inline]
    pub fn has_won(&self) -> bool {
        self.bet_number == LOTTERY_WINNER_NUMBER
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agency {} | {} {} ({}) | number {}",
            self.agency, self.first_name, self.last_name, self.document_id, self.bet_number
        )
    }
}
