//! Core types for the betting pool

use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used for bet start/end dates (month-day-year)
pub const DATE_FORMAT: &str = "%m-%d-%Y";

/// Lifecycle status of a bet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetStatus {
    Open,
    Closed,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Open => "open",
            BetStatus::Closed => "closed",
        }
    }

    /// Parse the stored status field. Anything but "open" counts as closed.
    pub fn from_stored(value: &str) -> Self {
        if value == "open" {
            BetStatus::Open
        } else {
            BetStatus::Closed
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single user's guess for a bet.
///
/// Field names on the wire match the payloads already persisted by earlier
/// deployments, so existing stores keep decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Number")]
    pub number: i64,
    #[serde(
        rename = "ExtraInfo",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub note: Option<String>,
}

impl Guess {
    pub fn new(user: impl Into<String>, number: i64, note: Option<String>) -> Self {
        Self {
            user: user.into(),
            number,
            note: note.filter(|n| !n.trim().is_empty()),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Bet metadata without the guess list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetSummary {
    pub id: i64,
    pub status: BetStatus,
    pub start_date: String,
    /// Empty until the bet is closed
    pub end_date: String,
    /// `None` until a winner score is recorded
    pub winner_score: Option<i64>,
}

impl BetSummary {
    pub fn is_open(&self) -> bool {
        self.status == BetStatus::Open
    }

    /// Date used when matching a bet to a month: end date, or start date while open
    pub fn reference_date(&self) -> &str {
        if self.end_date.is_empty() {
            &self.start_date
        } else {
            &self.end_date
        }
    }
}

impl fmt::Display for BetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\tstart: {}", self.id, self.start_date)?;
        if self.is_open() {
            f.write_str("\t(still open)")?;
        } else if !self.end_date.is_empty() {
            write!(f, "\tend: {}", self.end_date)?;
        }
        if let Some(score) = self.winner_score {
            write!(f, "\twinner score: {}", score)?;
        }
        Ok(())
    }
}

/// Which bet an info request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetRef {
    /// The most recently created bet
    Latest,
    Id(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_wire_format() {
        let guesses = vec![Guess::new("user1", 100, None)];
        let json = serde_json::to_string(&guesses).unwrap();
        assert_eq!(json, r#"[{"User":"user1","Number":100}]"#);

        let with_note = Guess::new("user2", 75, Some("gut feeling".to_string()));
        let json = serde_json::to_string(&with_note).unwrap();
        assert_eq!(json, r#"{"User":"user2","Number":75,"ExtraInfo":"gut feeling"}"#);
    }

    #[test]
    fn test_guess_empty_extra_info_is_no_note() {
        let guess: Guess =
            serde_json::from_str(r#"{"User":"u","Number":3,"ExtraInfo":""}"#).unwrap();
        assert_eq!(guess.note, None);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = BetSummary {
            id: 3,
            status: BetStatus::Open,
            start_date: "01-02-2024".to_string(),
            end_date: String::new(),
            winner_score: None,
        };
        assert_eq!(summary.to_string(), "3\tstart: 01-02-2024\t(still open)");

        summary.status = BetStatus::Closed;
        summary.end_date = "01-09-2024".to_string();
        summary.winner_score = Some(250);
        assert_eq!(
            summary.to_string(),
            "3\tstart: 01-02-2024\tend: 01-09-2024\twinner score: 250"
        );
    }
}
