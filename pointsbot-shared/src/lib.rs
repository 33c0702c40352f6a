pub mod domain;
pub mod market;

pub use domain::{
    DiscordId, NewPrediction, NewReservation, ParseStatusError, Prediction, PredictionBet,
    PredictionStatus, PredictionWithBets, Reservation, Side, User, WagerReceipt,
};
pub use market::{Settlement, SideTotals};
