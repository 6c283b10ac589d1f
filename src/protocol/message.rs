//! Requests and Replies
//!
//! A connection carries exactly one request and one reply. Two requests
//! exist:
//!
//! - a batch of bet records (see [`crate::protocol::parser`])
//! - a winners query: `<agency>,Winners, please?`
//!
//! Replies are short human-readable strings:
//!
//! | Reply          | Payload                         |
//! |----------------|---------------------------------|
//! | `Stored(n)`    | `<n> bets stored`               |
//! | `NotStored`    | `bets not stored`               |
//! | `NoWinnersYet` | `No winners yet`                |
//! | `Winners(ids)` | document ids joined by `;`      |

use crate::protocol::parser::{
    encode_bets, parse_bets, RecordError, FIELD_SEPARATOR, RECORD_SEPARATOR,
};
use crate::storage::Bet;
use std::fmt;

/// Trailing marker of a winners query.
pub const WINNERS_REQUEST: &str = "Winners, please?";

/// Reply text when a batch was rejected.
pub const NOT_STORED: &str = "bets not stored";

/// Suffix of the reply text when a batch was stored.
pub const STORED_SUFFIX: &str = "bets stored";

/// Reply text while the draw has not happened.
pub const NO_WINNERS_YET: &str = "No winners yet";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Persist these bets
    StoreBets(Vec<Bet>),
    /// Report the winners of this agency
    Winners { agency: u32 },
}

impl Request {
    /// Decodes a request payload.
    pub fn parse(payload: &str) -> Result<Self, RecordError> {
        if let Some(head) = payload.strip_suffix(WINNERS_REQUEST) {
            if let Some(text) = head.strip_suffix(FIELD_SEPARATOR) {
                // Canonical decimal only: "+1" and "01" are rejected
                return match text.parse::<u32>() {
                    Ok(agency) if agency.to_string() == text => Ok(Request::Winners { agency }),
                    _ => Err(RecordError::InvalidNumber {
                        record: 0,
                        field: "agency",
                        value: text.to_string(),
                    }),
                };
            }
        }

        parse_bets(payload).map(Request::StoreBets)
    }

    /// Encodes the request as a payload.
    pub fn encode(&self) -> String {
        match self {
            Request::StoreBets(bets) => encode_bets(bets),
            Request::Winners { agency } => {
                format!("{}{}{}", agency, FIELD_SEPARATOR, WINNERS_REQUEST)
            }
        }
    }
}

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored(usize),
    NotStored,
    NoWinnersYet,
    Winners(Vec<String>),
}

impl Reply {
    /// Returns true if the reply acknowledges a stored batch.
    pub fn is_stored(&self) -> bool {
        matches!(self, Reply::Stored(_))
    }

    /// Decodes a reply payload. Anything unrecognised is read as a winners list.
    pub fn parse(payload: &str) -> Self {
        if payload == NOT_STORED {
            return Reply::NotStored;
        }
        if payload == NO_WINNERS_YET {
            return Reply::NoWinnersYet;
        }
        if let Some(count) = payload
            .strip_suffix(STORED_SUFFIX)
            .and_then(|head| head.strip_suffix(' '))
            .and_then(|count| count.parse().ok())
        {
            return Reply::Stored(count);
        }
        if payload.is_empty() {
            return Reply::Winners(Vec::new());
        }
        Reply::Winners(
            payload
                .split(RECORD_SEPARATOR)
                .map(str::to_string)
                .collect(),
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Stored(count) => write!(f, "{} {}", count, STORED_SUFFIX),
            Reply::NotStored => f.write_str(NOT_STORED),
            Reply::NoWinnersYet => f.write_str(NO_WINNERS_YET),
            Reply::Winners(documents) => {
                f.write_str(&documents.join(&RECORD_SEPARATOR.to_string()))
            }
        }
    }
}
