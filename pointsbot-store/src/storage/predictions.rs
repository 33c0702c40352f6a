use diesel::prelude::*;
use diesel::upsert::excluded;
use pointsbot_shared::market::{self, Settlement};
use pointsbot_shared::{
    DiscordId, NewPrediction, Prediction, PredictionBet, PredictionStatus, PredictionWithBets,
    WagerReceipt,
};
use tracing::{info, trace, warn};

use super::models::{self, NewPredictionBet};
use super::schema::{prediction_bets, predictions};
use super::users::{credit_points, debit_points, load_balance};
use super::{StorageError, Store};

const OPEN_STATUSES: [&str; 2] = ["active", "locked"];

// Single-statement operations on predictions and bets.
impl Store {
    pub async fn create_prediction(&self, new: &NewPrediction) -> Result<i32, StorageError> {
        let new = new.clone();
        self.with_conn(move |conn| insert_prediction(conn, &new)).await
    }

    pub async fn get_prediction(&self, id: i32) -> Result<Option<Prediction>, StorageError> {
        self.with_conn(move |conn| load_prediction(conn, id)).await
    }

    /// The creator's active or locked prediction, if any.
    pub async fn open_prediction_for_creator(
        &self,
        creator_id: DiscordId,
    ) -> Result<Option<Prediction>, StorageError> {
        self.with_conn(move |conn| load_open_for_creator(conn, creator_id)).await
    }

    pub async fn list_predictions(
        &self,
        status: Option<PredictionStatus>,
    ) -> Result<Vec<Prediction>, StorageError> {
        self.with_conn(move |conn| {
            let mut query = predictions::table.into_boxed();
            if let Some(st) = status {
                query = query.filter(predictions::status.eq(st.as_str()));
            }
            query
                .order(predictions::id.asc())
                .load::<models::Prediction>(conn)?
                .into_iter()
                .map(Prediction::try_from)
                .collect()
        })
        .await
    }

    /// Writes the status, and the winner when one is given. Transitions are
    /// not checked here.
    pub async fn update_prediction_status(
        &self,
        id: i32,
        status: PredictionStatus,
        winner: Option<&str>,
    ) -> Result<bool, StorageError> {
        let winner = winner.map(str::to_string);
        self.with_conn(move |conn| write_status(conn, id, status, winner.as_deref())).await
    }

    /// Inserts a bet, or adds `points` to the user's existing bet on this
    /// prediction. The stored option of an existing bet is kept.
    pub async fn place_bet(
        &self,
        prediction_id: i32,
        user_id: DiscordId,
        option: &str,
        points: i32,
    ) -> Result<(), StorageError> {
        let option = option.to_string();
        self.with_conn(move |conn| {
            let previous = load_bet(conn, prediction_id, user_id)?.map_or(0, |b| b.points);
            checked_stake(previous, points)?;
            upsert_bet(conn, prediction_id, user_id, &option, points)
        })
        .await
    }

    pub async fn bets_for_prediction(
        &self,
        prediction_id: i32,
    ) -> Result<Vec<PredictionBet>, StorageError> {
        self.with_conn(move |conn| load_bets(conn, prediction_id)).await
    }

    /// Open predictions with their bets, for rebuilding in-memory state on
    /// startup.
    pub async fn restorable_predictions(&self) -> Result<Vec<PredictionWithBets>, StorageError> {
        self.with_conn(|conn| {
            let open = predictions::table
                .filter(predictions::status.eq_any(OPEN_STATUSES))
                .order(predictions::id.asc())
                .load::<models::Prediction>(conn)?;
            let bets = models::PredictionBet::belonging_to(&open)
                .order(prediction_bets::id.asc())
                .load::<models::PredictionBet>(conn)?
                .grouped_by(&open);
            open.into_iter()
                .zip(bets)
                .map(|(p, bets)| -> Result<PredictionWithBets, StorageError> {
                    Ok(PredictionWithBets {
                        prediction: Prediction::try_from(p)?,
                        bets: bets.into_iter().map(PredictionBet::from).collect(),
                    })
                })
                .collect()
        })
        .await
    }

    /// Deletes a prediction; its bets go with it.
    pub async fn delete_prediction(&self, id: i32) -> Result<bool, StorageError> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(predictions::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}

// Prediction lifecycle: each flow validates against the stored state, then
// issues its statements in order on one connection.
impl Store {
    pub async fn start_prediction(&self, new: &NewPrediction) -> Result<Prediction, StorageError> {
        if new.option_a == new.option_b {
            return Err(StorageError::InvalidInput(
                "options must be different".to_string(),
            ));
        }
        let new = new.clone();
        self.with_conn(move |conn| {
            if let Some(open) = load_open_for_creator(conn, new.creator_id)? {
                warn!(
                    creator_id = new.creator_id,
                    prediction_id = open.id,
                    "creator already has an open prediction"
                );
                return Err(StorageError::AlreadyOpen {
                    creator_id: new.creator_id,
                    prediction_id: open.id,
                });
            }
            let id = insert_prediction(conn, &new)?;
            info!(id, creator_id = new.creator_id, title = %new.title, "prediction started");
            require_prediction(conn, id)
        })
        .await
    }

    /// Stops further bets. Locking a locked prediction does nothing.
    pub async fn lock_prediction(&self, id: i32) -> Result<Prediction, StorageError> {
        self.with_conn(move |conn| {
            let prediction = require_prediction(conn, id)?;
            if prediction.status == PredictionStatus::Locked {
                return Ok(prediction);
            }
            transition(conn, prediction, PredictionStatus::Locked, None)
        })
        .await
    }

    /// Stakes `points` from the user's balance on `option`.
    pub async fn place_wager(
        &self,
        prediction_id: i32,
        user_id: DiscordId,
        option: &str,
        points: i32,
    ) -> Result<WagerReceipt, StorageError> {
        if points <= 0 {
            return Err(StorageError::InvalidInput(
                "wager must be more than 0 points".to_string(),
            ));
        }
        let option = option.to_string();
        self.with_conn(move |conn| {
            let prediction = require_prediction(conn, prediction_id)?;
            if prediction.status != PredictionStatus::Active {
                return Err(StorageError::PredictionClosed {
                    id: prediction_id,
                    status: prediction.status,
                });
            }
            let Some(side) = prediction.side_of(&option) else {
                return Err(StorageError::InvalidInput(format!(
                    "{option:?} is not an option of prediction {prediction_id}"
                )));
            };

            let existing = load_bet(conn, prediction_id, user_id)?;
            if let Some(bet) = &existing
                && prediction.side_of(&bet.option) != Some(side)
            {
                warn!(prediction_id, user_id, current = %bet.option, "tried to change sides");
                return Err(StorageError::SideSwitch {
                    current: bet.option.clone(),
                });
            }

            let previous = existing.map_or(0, |b| b.points);
            let total = checked_stake(previous, points)?;
            let available = load_balance(conn, user_id)?;
            if available < points {
                return Err(StorageError::InsufficientPoints {
                    available,
                    requested: points,
                });
            }

            debit_points(conn, user_id, points)?;
            upsert_bet(conn, prediction_id, user_id, &option, points)?;

            info!(prediction_id, user_id, option = %option, points, previous, "wager placed");
            Ok(WagerReceipt {
                prediction_id,
                user_id,
                option,
                previous,
                total,
            })
        })
        .await
    }

    /// Pays out the winning side and marks the prediction completed.
    ///
    /// When one side has no bets every stake is returned instead, and the
    /// prediction is still recorded as completed with its winner.
    pub async fn complete_prediction(
        &self,
        id: i32,
        winner: &str,
    ) -> Result<Settlement, StorageError> {
        let winner = winner.to_string();
        self.with_conn(move |conn| {
            let prediction = require_prediction(conn, id)?;
            let Some(side) = prediction.side_of(&winner) else {
                return Err(StorageError::InvalidInput(format!(
                    "winner must be one of the options: {:?} or {:?}",
                    prediction.option_a, prediction.option_b
                )));
            };
            ensure_transition(&prediction, PredictionStatus::Completed)?;

            let bets = load_bets(conn, id)?;
            let settlement = market::settle(&prediction, &bets, side);
            credit_points(conn, settlement.credits(), false)?;
            transition(conn, prediction, PredictionStatus::Completed, Some(winner.as_str()))?;

            match &settlement {
                Settlement::Payout {
                    multiplier,
                    distributed,
                    ..
                } => info!(id, winner = %winner, multiplier, distributed, "prediction completed"),
                Settlement::Refund { credits } => info!(
                    id,
                    refunded = credits.len(),
                    "prediction completed with one side empty; stakes refunded"
                ),
            }
            Ok(settlement)
        })
        .await
    }

    /// Returns every stake and marks the prediction refunded.
    pub async fn refund_prediction(&self, id: i32) -> Result<Vec<(DiscordId, i32)>, StorageError> {
        self.with_conn(move |conn| {
            let prediction = require_prediction(conn, id)?;
            refund(conn, prediction)
        })
        .await
    }

    /// Refunds the open prediction living in a deleted or unreachable thread.
    ///
    /// Returns the prediction id and the credits, or `None` when the thread
    /// holds no open prediction.
    pub async fn refund_prediction_for_thread(
        &self,
        thread_id: DiscordId,
    ) -> Result<Option<(i32, Vec<(DiscordId, i32)>)>, StorageError> {
        self.with_conn(move |conn| {
            let Some(prediction) = load_open_for_thread(conn, thread_id)? else {
                return Ok(None);
            };
            let id = prediction.id;
            info!(id, thread_id, "thread gone; refunding its prediction");
            Ok(Some((id, refund(conn, prediction)?)))
        })
        .await
    }
}

fn refund(
    conn: &mut SqliteConnection,
    prediction: Prediction,
) -> Result<Vec<(DiscordId, i32)>, StorageError> {
    let id = prediction.id;
    ensure_transition(&prediction, PredictionStatus::Refunded)?;
    let credits = market::refund(&load_bets(conn, id)?);
    credit_points(conn, &credits, false)?;
    transition(conn, prediction, PredictionStatus::Refunded, None)?;
    info!(id, refunded = credits.len(), "prediction refunded");
    Ok(credits)
}

fn checked_stake(previous: i32, points: i32) -> Result<i32, StorageError> {
    previous.checked_add(points).ok_or_else(|| {
        StorageError::InvalidInput(format!(
            "a stake of {previous} cannot grow by {points} points"
        ))
    })
}

fn insert_prediction(conn: &mut SqliteConnection, new: &NewPrediction) -> Result<i32, StorageError> {
    Ok(diesel::insert_into(predictions::table)
        .values(&models::NewPrediction {
            creator_id: new.creator_id,
            title: &new.title,
            option_a: &new.option_a,
            option_b: &new.option_b,
            thread_id: new.thread_id,
            message_id: new.message_id,
        })
        .returning(predictions::id)
        .get_result::<i32>(conn)?)
}

fn load_prediction(conn: &mut SqliteConnection, id: i32) -> Result<Option<Prediction>, StorageError> {
    predictions::table
        .find(id)
        .first::<models::Prediction>(conn)
        .optional()?
        .map(Prediction::try_from)
        .transpose()
}

fn require_prediction(conn: &mut SqliteConnection, id: i32) -> Result<Prediction, StorageError> {
    load_prediction(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("prediction {id}")))
}

fn load_open_for_creator(
    conn: &mut SqliteConnection,
    creator_id: DiscordId,
) -> Result<Option<Prediction>, StorageError> {
    predictions::table
        .filter(predictions::creator_id.eq(creator_id))
        .filter(predictions::status.eq_any(OPEN_STATUSES))
        .order(predictions::id.asc())
        .first::<models::Prediction>(conn)
        .optional()?
        .map(Prediction::try_from)
        .transpose()
}

fn load_open_for_thread(
    conn: &mut SqliteConnection,
    thread_id: DiscordId,
) -> Result<Option<Prediction>, StorageError> {
    predictions::table
        .filter(predictions::thread_id.eq(thread_id))
        .filter(predictions::status.eq_any(OPEN_STATUSES))
        .order(predictions::id.asc())
        .first::<models::Prediction>(conn)
        .optional()?
        .map(Prediction::try_from)
        .transpose()
}

fn load_bet(
    conn: &mut SqliteConnection,
    prediction_id: i32,
    user_id: DiscordId,
) -> Result<Option<models::PredictionBet>, StorageError> {
    Ok(prediction_bets::table
        .filter(prediction_bets::prediction_id.eq(prediction_id))
        .filter(prediction_bets::user_id.eq(user_id))
        .first::<models::PredictionBet>(conn)
        .optional()?)
}

fn load_bets(
    conn: &mut SqliteConnection,
    prediction_id: i32,
) -> Result<Vec<PredictionBet>, StorageError> {
    Ok(prediction_bets::table
        .filter(prediction_bets::prediction_id.eq(prediction_id))
        .order(prediction_bets::id.asc())
        .load::<models::PredictionBet>(conn)?
        .into_iter()
        .map(PredictionBet::from)
        .collect())
}

fn upsert_bet(
    conn: &mut SqliteConnection,
    prediction_id: i32,
    user_id: DiscordId,
    option: &str,
    points: i32,
) -> Result<(), StorageError> {
    trace!(prediction_id, user_id, option, points, "upserting bet");
    diesel::insert_into(prediction_bets::table)
        .values(&NewPredictionBet {
            prediction_id,
            user_id,
            option,
            points,
        })
        .on_conflict((prediction_bets::prediction_id, prediction_bets::user_id))
        .do_update()
        .set(
            prediction_bets::points.eq(prediction_bets::points + excluded(prediction_bets::points)),
        )
        .execute(conn)?;
    Ok(())
}

fn write_status(
    conn: &mut SqliteConnection,
    id: i32,
    status: PredictionStatus,
    winner: Option<&str>,
) -> Result<bool, StorageError> {
    let target = predictions::table.find(id);
    let updated = match winner {
        Some(w) => diesel::update(target)
            .set((
                predictions::status.eq(status.as_str()),
                predictions::winner.eq(w),
            ))
            .execute(conn)?,
        None => diesel::update(target)
            .set(predictions::status.eq(status.as_str()))
            .execute(conn)?,
    };
    Ok(updated > 0)
}

fn ensure_transition(prediction: &Prediction, to: PredictionStatus) -> Result<(), StorageError> {
    if prediction.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(StorageError::InvalidTransition {
            id: prediction.id,
            from: prediction.status,
            to,
        })
    }
}

fn transition(
    conn: &mut SqliteConnection,
    mut prediction: Prediction,
    to: PredictionStatus,
    winner: Option<&str>,
) -> Result<Prediction, StorageError> {
    ensure_transition(&prediction, to)?;
    write_status(conn, prediction.id, to, winner)?;
    trace!(id = prediction.id, from = %prediction.status, to = %to, "status changed");
    prediction.status = to;
    if let Some(w) = winner {
        prediction.winner = Some(w.to_string());
    }
    Ok(prediction)
}
