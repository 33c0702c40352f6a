//! Parimutuel arithmetic for two-option predictions.
//!
//! Winners split the losing pool in proportion to their stake: a winning bet
//! of `p` points returns `round(p * (1 + losing_total / winning_total))`,
//! with halves rounded to the even neighbour.

use serde::{Deserialize, Serialize};

use crate::domain::{DiscordId, Prediction, PredictionBet, Side};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideTotals {
    pub points_a: i64,
    pub bettors_a: usize,
    pub points_b: i64,
    pub bettors_b: usize,
}

impl SideTotals {
    /// Bets whose option matches neither side are not counted.
    pub fn from_bets(prediction: &Prediction, bets: &[PredictionBet]) -> Self {
        let mut totals = SideTotals::default();
        for bet in bets {
            match prediction.side_of(&bet.option) {
                Some(Side::A) => {
                    totals.points_a += i64::from(bet.points);
                    totals.bettors_a += 1;
                }
                Some(Side::B) => {
                    totals.points_b += i64::from(bet.points);
                    totals.bettors_b += 1;
                }
                None => {}
            }
        }
        totals
    }

    pub fn points(&self, side: Side) -> i64 {
        match side {
            Side::A => self.points_a,
            Side::B => self.points_b,
        }
    }

    pub fn bettors(&self, side: Side) -> usize {
        match side {
            Side::A => self.bettors_a,
            Side::B => self.bettors_b,
        }
    }

    /// Payout multiplier a bet on `side` would receive if it won right now.
    pub fn odds(&self, side: Side) -> f64 {
        odds(self.points(side), self.points(side.other()))
    }
}

pub fn odds(own_total: i64, other_total: i64) -> f64 {
    if own_total <= 0 {
        return 1.0;
    }
    1.0 + other_total as f64 / own_total as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Settlement {
    /// Winners are paid out of the losing pool.
    Payout {
        winner: Side,
        multiplier: f64,
        /// Points staked by the losing side.
        distributed: i64,
        credits: Vec<(DiscordId, i32)>,
    },
    /// One side had no bets, so every stake goes back.
    Refund { credits: Vec<(DiscordId, i32)> },
}

impl Settlement {
    pub fn credits(&self) -> &[(DiscordId, i32)] {
        match self {
            Settlement::Payout { credits, .. } | Settlement::Refund { credits } => credits,
        }
    }

    pub fn is_refund(&self) -> bool {
        matches!(self, Settlement::Refund { .. })
    }
}

pub fn settle(prediction: &Prediction, bets: &[PredictionBet], winner: Side) -> Settlement {
    let totals = SideTotals::from_bets(prediction, bets);
    if totals.bettors_a == 0 || totals.bettors_b == 0 {
        return Settlement::Refund {
            credits: refund(bets),
        };
    }

    let multiplier = totals.odds(winner);
    let credits = bets
        .iter()
        .filter_map(|bet| match prediction.side_of(&bet.option) {
            Some(side) if side == winner => Some((bet.user_id, payout(bet.points, multiplier))),
            Some(_) => None,
            // Stakes on an option the prediction never offered are returned.
            None => Some((bet.user_id, bet.points)),
        })
        .collect();

    Settlement::Payout {
        winner,
        multiplier,
        distributed: totals.points(winner.other()),
        credits,
    }
}

pub fn refund(bets: &[PredictionBet]) -> Vec<(DiscordId, i32)> {
    bets.iter().map(|b| (b.user_id, b.points)).collect()
}

fn payout(points: i32, multiplier: f64) -> i32 {
    let value = (f64::from(points) * multiplier).round_ties_even();
    if value >= f64::from(i32::MAX) {
        i32::MAX
    } else {
        value as i32
    }
}
