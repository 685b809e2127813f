//! Participant metadata table
//!
//! Reads the BIDS `participants.tsv` and resolves, for every subject, which
//! session was recorded under which condition.

use crate::error::{Result, SpecParamError};
use crate::types::Condition;
use serde::Deserialize;
use std::path::Path;

pub const PARTICIPANT_ID_COLUMN: &str = "participant_id";
pub const SESSION_ORDER_COLUMN: &str = "SessionOrder";

/// Session order label meaning the normal-sleep session came first
pub const NS_FIRST: &str = "NS->SD";

pub const SESSIONS: [&str; 2] = ["ses-1", "ses-2"];

#[derive(Debug, Deserialize)]
struct ParticipantRow {
    participant_id: String,
    #[serde(rename = "SessionOrder")]
    session_order: String,
}

/// One row of the participants table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub participant_id: String,
    pub session_order: String,
}

impl Participant {
    /// Session labels paired with their condition, in visitation order.
    ///
    /// `NS->SD` puts normal sleep in `ses-1`; every other label is read as
    /// sleep deprivation first.
    pub fn sessions(&self) -> [(&'static str, Condition); 2] {
        if self.session_order == NS_FIRST {
            [(SESSIONS[0], Condition::NS), (SESSIONS[1], Condition::SD)]
        } else {
            [(SESSIONS[0], Condition::SD), (SESSIONS[1], Condition::NS)]
        }
    }
}

/// Read a tab-separated participants table.
pub fn read_participants(path: &Path) -> Result<Vec<Participant>> {
    if !path.is_file() {
        return Err(SpecParamError::ParticipantsNotFound(
            path.display().to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    for required in [PARTICIPANT_ID_COLUMN, SESSION_ORDER_COLUMN] {
        if !headers.iter().any(|h| h == required) {
            return Err(SpecParamError::InvalidParticipants(format!(
                "missing column '{}' in {}",
                required,
                path.display()
            )));
        }
    }

    let mut participants = Vec::new();
    for (line, record) in reader.deserialize::<ParticipantRow>().enumerate() {
        let row = record.map_err(|e| {
            SpecParamError::InvalidParticipants(format!("row {}: {}", line + 1, e))
        })?;
        if row.participant_id.is_empty() {
            return Err(SpecParamError::InvalidParticipants(format!(
                "row {}: empty {}",
                line + 1,
                PARTICIPANT_ID_COLUMN
            )));
        }
        participants.push(Participant {
            participant_id: row.participant_id,
            session_order: row.session_order,
        });
    }

    log::debug!(
        "Read {} participants from {}",
        participants.len(),
        path.display()
    );
    Ok(participants)
}
