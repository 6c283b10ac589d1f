//! Bet Record Parser
//!
//! A decoded payload carries one or more bet records:
//!
//! ```text
//! payload := record (';' record)*
//! record  := birth_date ',' bet_number ',' first_name ',' last_name ',' agency ',' document_id
//! ```
//!
//! The wire order is NOT the order of the [`Bet`] fields. Records are
//! reassembled into the canonical `(document_id, first_name, last_name,
//! agency, bet_number, birth_date)` order through the `field` indices below.
//!
//! Parsing is all-or-nothing: one bad record rejects the whole payload.

use crate::storage::Bet;
use chrono::NaiveDate;
use thiserror::Error;

/// Separates records within a payload.
pub const RECORD_SEPARATOR: char = ';';

/// Separates fields within a record.
pub const FIELD_SEPARATOR: char = ',';

/// Number of fields in every record.
pub const FIELDS_PER_RECORD: usize = 6;

/// Format of `birth_date` on the wire (ISO 8601 calendar date).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Position of each field on the wire.
mod field {
    pub const BIRTH_DATE: usize = 0;
    pub const BET_NUMBER: usize = 1;
    pub const FIRST_NAME: usize = 2;
    pub const LAST_NAME: usize = 3;
    pub const AGENCY: usize = 4;
    pub const DOCUMENT_ID: usize = 5;
}

/// Errors raised while parsing bet records.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// The payload holds no record at all
    #[error("empty payload")]
    EmptyPayload,

    /// A record between two separators is empty
    #[error("record {record} is empty")]
    EmptyRecord { record: usize },

    /// A record does not have exactly six fields
    #[error("record {record} has {found} fields, expected 6")]
    FieldCount { record: usize, found: usize },

    /// A field is present but empty
    #[error("record {record}: field '{field}' is empty")]
    EmptyField { record: usize, field: &'static str },

    /// A numeric field is not a valid non-negative integer
    #[error("record {record}: invalid {field} {value:?}")]
    InvalidNumber {
        record: usize,
        field: &'static str,
        value: String,
    },

    /// The birth date is not a `YYYY-MM-DD` date
    #[error("record {record}: invalid birth date {value:?}")]
    InvalidDate { record: usize, value: String },
}

/// Parses every bet record in `payload`.
///
/// # Example
///
/// ```
/// use betrelay::protocol::parse_bets;
///
/// let bets = parse_bets("1990-01-01,42,Juan,Perez,1,30904465").unwrap();
/// assert_eq!(bets[0].document_id(), "30904465");
/// assert_eq!(bets[0].bet_number(), 42);
/// assert_eq!(bets[0].agency(), 1);
/// ```
pub fn parse_bets(payload: &str) -> Result<Vec<Bet>, RecordError> {
    if payload.is_empty() {
        return Err(RecordError::EmptyPayload);
    }

    payload
        .split(RECORD_SEPARATOR)
        .enumerate()
        .map(|(record, text)| parse_record(record, text))
        .collect()
}

/// Parses a single record; `record` is its index, used in errors.
fn parse_record(record: usize, text: &str) -> Result<Bet, RecordError> {
    if text.is_empty() {
        return Err(RecordError::EmptyRecord { record });
    }

    let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELDS_PER_RECORD {
        return Err(RecordError::FieldCount {
            record,
            found: fields.len(),
        });
    }

    let get = |index: usize, name: &'static str| field_value(&fields, record, index, name);

    let birth_date = get(field::BIRTH_DATE, "birth_date")?;
    let bet_number = get(field::BET_NUMBER, "bet_number")?;
    let first_name = get(field::FIRST_NAME, "first_name")?;
    let last_name = get(field::LAST_NAME, "last_name")?;
    let agency = get(field::AGENCY, "agency")?;
    let document_id = get(field::DOCUMENT_ID, "document_id")?;

    Ok(Bet::new(
        document_id,
        first_name,
        last_name,
        parse_number(record, "agency", agency)?,
        parse_number(record, "bet_number", bet_number)?,
        parse_date(record, birth_date)?,
    ))
}

fn field_value<'a>(
    fields: &[&'a str],
    record: usize,
    index: usize,
    name: &'static str,
) -> Result<&'a str, RecordError> {
    match fields[index] {
        "" => Err(RecordError::EmptyField {
            record,
            field: name,
        }),
        value => Ok(value),
    }
}

fn parse_number(record: usize, field: &'static str, value: &str) -> Result<u32, RecordError> {
    let invalid = || RecordError::InvalidNumber {
        record,
        field,
        value: value.to_string(),
    };

    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

fn parse_date(record: usize, value: &str) -> Result<NaiveDate, RecordError> {
    let invalid = || RecordError::InvalidDate {
        record,
        value: value.to_string(),
    };

    // chrono accepts unpadded fields, leading spaces and signed years; the
    // wire only carries zero-padded `YYYY-MM-DD`
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

/// Encodes bets back into a payload, in wire order.
///
/// This is the inverse of [`parse_bets`] for well-formed bets.
pub fn encode_bets(bets: &[Bet]) -> String {
    let records: Vec<String> = bets.iter().map(encode_record).collect();
    records.join(&RECORD_SEPARATOR.to_string())
}

fn encode_record(bet: &Bet) -> String {
    let mut fields: [String; FIELDS_PER_RECORD] = Default::default();
    fields[field::BIRTH_DATE] = bet.birth_date().format(DATE_FORMAT).to_string();
    fields[field::BET_NUMBER] = bet.bet_number().to_string();
    fields[field::FIRST_NAME] = bet.first_name().to_string();
    fields[field::LAST_NAME] = bet.last_name().to_string();
    fields[field::AGENCY] = bet.agency().to_string();
    fields[field::DOCUMENT_ID] = bet.document_id().to_string();
    fields.join(&FIELD_SEPARATOR.to_string())
}
