use std::time::Duration;

use pointsbot_shared::market::SideTotals;
use pointsbot_shared::{NewPrediction, NewReservation, Prediction, Reservation, Settlement, Side};
use pointsbot_store::config::AppConfig;
use pointsbot_store::points::PointsBuffer;
use pointsbot_store::storage::{StorageError, Store};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use crate::cli::{Command, PredictionCommand, ReservationCommand};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Refused(String),
}

pub async fn run(cmd: Command, store: &Store, config: &AppConfig) -> Result<(), CommandError> {
    match cmd {
        Command::Init { yes } => {
            if !yes {
                return Err(CommandError::Refused(
                    "init drops every table; pass --yes to confirm".to_string(),
                ));
            }
            store.reset_schema().await?;
            println!("database reset: users, reservations, predictions, prediction_bets");
        }
        Command::Balance { user } => {
            let points = store.balance(user).await?;
            println!("{user}: {points} points");
        }
        Command::Award { user, points } => {
            store.award_points(&[(user, points)]).await?;
            let balance = store.balance(user).await?;
            println!("{user}: +{points} -> {balance} points");
        }
        Command::Top { limit } => {
            for (rank, user) in store.list_top_users(limit).await?.iter().enumerate() {
                println!("{:>3}. {} {} points", rank + 1, user.discord_id, user.points);
            }
        }
        Command::Activity { users, follow } => {
            let mut buffer = PointsBuffer::new(config.activity.award_range());
            let mut rng = StdRng::from_entropy();
            for user in users {
                buffer.record_activity(user, &mut rng);
            }
            if follow {
                let interval = Duration::from_secs(config.activity.flush_interval_secs);
                follow_activity(store, &mut buffer, &mut rng, interval).await?;
            } else {
                let credited = buffer.flush(store).await?;
                println!("credited {credited} users");
            }
        }
        Command::Reservation(cmd) => run_reservation(cmd, store).await?,
        Command::Prediction(cmd) => run_prediction(cmd, store).await?,
    }
    Ok(())
}

/// Mirrors the bot's message listener: every line is one message from the
/// user whose id it holds, and awards are written on a fixed interval.
async fn follow_activity(
    store: &Store,
    buffer: &mut PointsBuffer,
    rng: &mut StdRng,
    interval: Duration,
) -> Result<(), CommandError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse() {
                    Ok(user) => {
                        buffer.record_activity(user, rng);
                    }
                    Err(e) => tracing::warn!(%line, error = %e, "ignoring malformed user id"),
                }
            }
            _ = ticker.tick() => {
                buffer.flush(store).await?;
            }
        }
    }
    let credited = buffer.flush(store).await?;
    tracing::info!(credited, "stdin closed; final flush done");
    Ok(())
}

async fn run_reservation(cmd: ReservationCommand, store: &Store) -> Result<(), CommandError> {
    match cmd {
        ReservationCommand::Add {
            team,
            pcs,
            start,
            end,
            manager,
            prime_time,
        } => {
            let r = store
                .create_reservation(&NewReservation {
                    team,
                    pcs,
                    start_time: start,
                    end_time: end,
                    manager,
                    prime_time,
                })
                .await?;
            print_reservation(&r);
        }
        ReservationCommand::List { from, to } => {
            let rows = match (from, to) {
                (Some(from), Some(to)) => store.list_reservations_between(from, to).await?,
                _ => store.list_reservations().await?,
            };
            for r in &rows {
                print_reservation(r);
            }
        }
        ReservationCommand::Show { id } => match store.get_reservation(id).await? {
            Some(r) => print_reservation(&r),
            None => return Err(StorageError::NotFound(format!("reservation {id}")).into()),
        },
        ReservationCommand::Remove { id } => {
            if !store.delete_reservation(id).await? {
                return Err(StorageError::NotFound(format!("reservation {id}")).into());
            }
            println!("reservation {id} removed");
        }
    }
    Ok(())
}

async fn run_prediction(cmd: PredictionCommand, store: &Store) -> Result<(), CommandError> {
    match cmd {
        PredictionCommand::Start {
            creator,
            title,
            option_a,
            option_b,
            thread,
            message,
        } => {
            let p = store
                .start_prediction(&NewPrediction {
                    creator_id: creator,
                    title,
                    option_a,
                    option_b,
                    thread_id: thread,
                    message_id: message,
                })
                .await?;
            println!("prediction {} started: {}", p.id, p.title);
        }
        PredictionCommand::Lock { id } => {
            store.lock_prediction(id).await?;
            println!("prediction {id} locked");
        }
        PredictionCommand::Bet {
            id,
            user,
            option,
            points,
        } => {
            let receipt = store.place_wager(id, user, &option, points).await?;
            let mut line = format!("{user} bet {} points on {}", receipt.total, receipt.option);
            if receipt.previous > 0 {
                line.push_str(&format!(" (up from {})", receipt.previous));
            }
            println!("{line}");
        }
        PredictionCommand::Complete { id, winner } => {
            match store.complete_prediction(id, &winner).await? {
                Settlement::Payout {
                    multiplier,
                    distributed,
                    ..
                } => println!(
                    "prediction completed: {distributed} points distributed to {winner} ({multiplier:.2}x payout)"
                ),
                Settlement::Refund { .. } => {
                    println!("everyone voted the same way, points refunded")
                }
            }
        }
        PredictionCommand::Refund { id } => {
            let credits = store.refund_prediction(id).await?;
            println!("prediction {id} refunded to {} users", credits.len());
        }
        PredictionCommand::ThreadGone { thread } => {
            match store.refund_prediction_for_thread(thread).await? {
                Some((id, credits)) => {
                    println!("prediction {id} refunded to {} users", credits.len())
                }
                None => println!("no open prediction in thread {thread}"),
            }
        }
        PredictionCommand::Show { id } => {
            let Some(p) = store.get_prediction(id).await? else {
                return Err(StorageError::NotFound(format!("prediction {id}")).into());
            };
            let bets = store.bets_for_prediction(id).await?;
            print_prediction(&p);
            let totals = SideTotals::from_bets(&p, &bets);
            for side in [Side::A, Side::B] {
                println!(
                    "  {}: {} points, {} users, {:.2}x payout",
                    p.option(side),
                    totals.points(side),
                    totals.bettors(side),
                    totals.odds(side)
                );
            }
            for bet in &bets {
                println!("    {} -> {} ({})", bet.user_id, bet.option, bet.points);
            }
        }
        PredictionCommand::List { status, open } => {
            if open {
                for entry in store.restorable_predictions().await? {
                    print_prediction(&entry.prediction);
                    println!("  {} bets", entry.bets.len());
                }
            } else {
                for p in store.list_predictions(status).await? {
                    print_prediction(&p);
                }
            }
        }
        PredictionCommand::Delete { id } => {
            if !store.delete_prediction(id).await? {
                return Err(StorageError::NotFound(format!("prediction {id}")).into());
            }
            println!("prediction {id} deleted");
        }
    }
    Ok(())
}

fn print_reservation(r: &Reservation) {
    let pcs: Vec<String> = r.pcs.iter().map(i32::to_string).collect();
    println!(
        "#{} {} pcs [{}] {} -> {} manager {}{}",
        r.id,
        r.team,
        pcs.join(","),
        r.start_time.to_rfc3339(),
        r.end_time.to_rfc3339(),
        r.manager,
        if r.prime_time { " (prime time)" } else { "" }
    );
}

fn print_prediction(p: &Prediction) {
    println!(
        "#{} [{}] {}: {} vs {}{}",
        p.id,
        p.status,
        p.title,
        p.option_a,
        p.option_b,
        p.winner
            .as_deref()
            .map(|w| format!(" (winner: {w})"))
            .unwrap_or_default()
    );
}
