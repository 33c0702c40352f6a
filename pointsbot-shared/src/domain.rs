use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discord snowflake identifying a user, thread or message.
pub type DiscordId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub discord_id: DiscordId,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i32,
    pub team: String,
    pub pcs: Vec<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub manager: String,
    pub prime_time: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub team: String,
    pub pcs: Vec<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub manager: String,
    pub prime_time: bool,
}

/// Lifecycle of a prediction market.
///
/// The column holding it is free text; this enum is the only place the
/// allowed values and transitions are written down.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Active,
    Locked,
    Completed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown prediction status: {0:?}")]
pub struct ParseStatusError(pub String);

impl PredictionStatus {
    pub const ALL: [PredictionStatus; 4] = [
        PredictionStatus::Active,
        PredictionStatus::Locked,
        PredictionStatus::Completed,
        PredictionStatus::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PredictionStatus::Active => "active",
            PredictionStatus::Locked => "locked",
            PredictionStatus::Completed => "completed",
            PredictionStatus::Refunded => "refunded",
        }
    }

    /// Active or locked: bets are held and the market can still be settled.
    pub fn is_open(self) -> bool {
        matches!(self, PredictionStatus::Active | PredictionStatus::Locked)
    }

    pub fn is_final(self) -> bool {
        !self.is_open()
    }

    pub fn can_transition_to(self, next: PredictionStatus) -> bool {
        use PredictionStatus::*;
        matches!(
            (self, next),
            (Active, Locked)
                | (Active, Completed)
                | (Locked, Completed)
                | (Active, Refunded)
                | (Locked, Refunded)
        )
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionStatus {
    type Err = ParseStatusError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PredictionStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i32,
    pub creator_id: DiscordId,
    pub title: String,
    pub option_a: String,
    pub option_b: String,
    pub status: PredictionStatus,
    pub winner: Option<String>,
    pub thread_id: DiscordId,
    pub message_id: DiscordId,
}

impl Prediction {
    pub fn side_of(&self, option: &str) -> Option<Side> {
        if option == self.option_a {
            Some(Side::A)
        } else if option == self.option_b {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn option(&self, side: Side) -> &str {
        match side {
            Side::A => &self.option_a,
            Side::B => &self.option_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrediction {
    pub creator_id: DiscordId,
    pub title: String,
    pub option_a: String,
    pub option_b: String,
    pub thread_id: DiscordId,
    pub message_id: DiscordId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionBet {
    pub id: i32,
    pub prediction_id: i32,
    pub user_id: DiscordId,
    pub option: String,
    pub points: i32,
}

/// An open prediction together with every bet placed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionWithBets {
    pub prediction: Prediction,
    pub bets: Vec<PredictionBet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerReceipt {
    pub prediction_id: i32,
    pub user_id: DiscordId,
    pub option: String,
    /// Stake held before this wager; zero on a first bet.
    pub previous: i32,
    pub total: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction() -> Prediction {
        Prediction {
            id: 1,
            creator_id: 10,
            title: "Who wins?".into(),
            option_a: "Red".into(),
            option_b: "Blue".into(),
            status: PredictionStatus::Active,
            winner: None,
            thread_id: 100,
            message_id: 200,
        }
    }

    #[test]
    fn status_text_round_trips() {
        for st in PredictionStatus::ALL {
            assert_eq!(st.as_str().parse::<PredictionStatus>(), Ok(st));
        }
        assert_eq!(
            "Active".parse::<PredictionStatus>(),
            Err(ParseStatusError("Active".into()))
        );
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&PredictionStatus::Refunded).unwrap();
        assert_eq!(json, "\"refunded\"");
    }

    #[test]
    fn transitions_follow_lifecycle() {
        use PredictionStatus::*;
        let allowed = [
            (Active, Locked),
            (Active, Completed),
            (Locked, Completed),
            (Active, Refunded),
            (Locked, Refunded),
        ];
        for from in PredictionStatus::ALL {
            for to in PredictionStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
        assert!(Locked.is_open());
        assert!(Completed.is_final());
    }

    #[test]
    fn side_of_matches_exact_option() {
        let p = prediction();
        assert_eq!(p.side_of("Red"), Some(Side::A));
        assert_eq!(p.side_of("Blue"), Some(Side::B));
        assert_eq!(p.side_of("red"), None);
        assert_eq!(p.option(Side::A.other()), "Blue");
    }
}
