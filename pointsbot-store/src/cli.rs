use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pointsbot_shared::{DiscordId, PredictionStatus};

const HELP_EPILOG: &str = r#"Options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml, optional)
  DB_PATH     (default: config.database_path, then data/points.db)
  RUST_LOG    (default: info)

Timestamps are RFC 3339, e.g. 2025-06-01T18:00:00Z.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "pointsbot",
    version,
    about = "Points, reservations and predictions database",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drop and recreate every table. All data is lost.
    Init {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Show a user's point balance
    Balance { user: DiscordId },
    /// Add points to a user, creating the user if needed
    Award {
        user: DiscordId,
        #[arg(allow_negative_numbers = true)]
        points: i32,
    },
    /// Users with the most points
    Top {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Roll activity awards for the given users and credit them
    Activity {
        users: Vec<DiscordId>,
        /// Read one user id per line from stdin, flushing on the configured interval
        #[arg(long)]
        follow: bool,
    },
    #[command(subcommand)]
    Reservation(ReservationCommand),
    #[command(subcommand)]
    Prediction(PredictionCommand),
}

#[derive(Debug, Subcommand)]
pub enum ReservationCommand {
    /// Book PCs for a team
    Add {
        #[arg(long)]
        team: String,
        /// Comma separated PC numbers
        #[arg(long, value_delimiter = ',', required = true)]
        pcs: Vec<i32>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long)]
        manager: String,
        #[arg(long)]
        prime_time: bool,
    },
    /// List reservations, optionally only those overlapping a window
    List {
        #[arg(long, requires = "to")]
        from: Option<DateTime<Utc>>,
        #[arg(long, requires = "from")]
        to: Option<DateTime<Utc>>,
    },
    Show { id: i32 },
    Remove { id: i32 },
}

#[derive(Debug, Subcommand)]
pub enum PredictionCommand {
    /// Open a prediction with two options
    Start {
        #[arg(long)]
        creator: DiscordId,
        #[arg(long)]
        title: String,
        option_a: String,
        option_b: String,
        /// Discord thread holding the prediction
        #[arg(long)]
        thread: DiscordId,
        /// Discord message carrying the bet buttons
        #[arg(long)]
        message: DiscordId,
    },
    /// Stop accepting bets
    Lock { id: i32 },
    /// Wager points on an option
    Bet {
        id: i32,
        #[arg(long)]
        user: DiscordId,
        option: String,
        points: i32,
    },
    /// Settle with a winning option and pay out
    Complete { id: i32, winner: String },
    /// Cancel and return every stake
    Refund { id: i32 },
    /// Refund the open prediction of a deleted or unreachable thread
    ThreadGone { thread: DiscordId },
    Show { id: i32 },
    List {
        #[arg(long)]
        status: Option<PredictionStatus>,
        /// Only open predictions, with their bets
        #[arg(long, conflicts_with = "status")]
        open: bool,
    },
    /// Delete a prediction and its bets
    Delete { id: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reservation_pcs_list() {
        let cli = Cli::try_parse_from([
            "pointsbot",
            "reservation",
            "add",
            "--team",
            "Varsity",
            "--pcs",
            "1,2,5",
            "--start",
            "2025-06-01T18:00:00Z",
            "--end",
            "2025-06-01T20:00:00Z",
            "--manager",
            "sam",
        ])
        .unwrap();
        match cli.command {
            Command::Reservation(ReservationCommand::Add {
                pcs, prime_time, ..
            }) => {
                assert_eq!(pcs, vec![1, 2, 5]);
                assert!(!prime_time);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_prediction_status_filter() {
        let cli =
            Cli::try_parse_from(["pointsbot", "prediction", "list", "--status", "locked"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Prediction(PredictionCommand::List {
                status: Some(PredictionStatus::Locked),
                open: false
            })
        ));
        assert!(
            Cli::try_parse_from(["pointsbot", "prediction", "list", "--status", "open"]).is_err()
        );
    }

    #[test]
    fn parses_thread_gone() {
        let cli = Cli::try_parse_from(["pointsbot", "prediction", "thread-gone", "555"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Prediction(PredictionCommand::ThreadGone { thread: 555 })
        ));
    }
}
