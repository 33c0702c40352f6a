use crate::storage::StorageError;
use crate::storage::schema::{prediction_bets, predictions, reservations, users};
use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use diesel::{AsExpression, FromSqlRow};
use pointsbot_shared::domain;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
#[diesel(primary_key(discordid))]
pub struct User {
    pub discordid: i64,
    pub points: i32,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub discordid: i64,
    pub points: i32,
}

impl From<User> for domain::User {
    fn from(u: User) -> Self {
        domain::User {
            discord_id: u.discordid,
            points: u.points,
        }
    }
}

/// PC numbers of a reservation, stored as a JSON array in a text column.
#[derive(Debug, Clone, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = Text)]
pub struct Pcs(pub Vec<i32>);

impl FromSql<Text, Sqlite> for Pcs {
    fn from_sql(bytes: SqliteValue<'_, '_, '_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(Pcs(serde_json::from_str(&s)?))
    }
}

impl ToSql<Text, Sqlite> for Pcs {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = reservations)]
pub struct Reservation {
    pub id: i32,
    pub team: String,
    pub pcs: Pcs,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub manager: String,
    pub prime_time: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = reservations)]
pub struct NewReservation<'a> {
    pub team: &'a str,
    pub pcs: Pcs,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub manager: &'a str,
    pub prime_time: bool,
}

impl From<Reservation> for domain::Reservation {
    fn from(r: Reservation) -> Self {
        domain::Reservation {
            id: r.id,
            team: r.team,
            pcs: r.pcs.0,
            start_time: r.start_time.and_utc(),
            end_time: r.end_time.and_utc(),
            manager: r.manager,
            prime_time: r.prime_time,
            created_at: r.created_at.and_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = predictions)]
pub struct Prediction {
    pub id: i32,
    pub creator_id: Option<i64>,
    pub title: Option<String>,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub status: String,
    pub winner: Option<String>,
    pub thread_id: Option<i64>,
    pub message_id: Option<i64>,
}

#[derive(Insertable)]
#[diesel(table_name = predictions)]
pub struct NewPrediction<'a> {
    pub creator_id: i64,
    pub title: &'a str,
    pub option_a: &'a str,
    pub option_b: &'a str,
    pub thread_id: i64,
    pub message_id: i64,
}

/// Rows with a missing column the bot always writes are reported as corrupt.
impl TryFrom<Prediction> for domain::Prediction {
    type Error = StorageError;

    fn try_from(p: Prediction) -> Result<Self, Self::Error> {
        let id = p.id;
        let missing =
            |column: &str| StorageError::Corrupt(format!("prediction {id} has no {column}"));
        Ok(domain::Prediction {
            id,
            creator_id: p.creator_id.ok_or_else(|| missing("creator_id"))?,
            title: p.title.ok_or_else(|| missing("title"))?,
            option_a: p.option_a.ok_or_else(|| missing("option_a"))?,
            option_b: p.option_b.ok_or_else(|| missing("option_b"))?,
            status: p.status.parse()?,
            winner: p.winner,
            thread_id: p.thread_id.ok_or_else(|| missing("thread_id"))?,
            message_id: p.message_id.ok_or_else(|| missing("message_id"))?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = prediction_bets)]
#[diesel(belongs_to(Prediction, foreign_key = prediction_id))]
pub struct PredictionBet {
    pub id: i32,
    pub prediction_id: i32,
    pub user_id: i64,
    pub option: String,
    pub points: i32,
}

#[derive(Insertable)]
#[diesel(table_name = prediction_bets)]
pub struct NewPredictionBet<'a> {
    pub prediction_id: i32,
    pub user_id: i64,
    pub option: &'a str,
    pub points: i32,
}

impl From<PredictionBet> for domain::PredictionBet {
    fn from(b: PredictionBet) -> Self {
        domain::PredictionBet {
            id: b.id,
            prediction_id: b.prediction_id,
            user_id: b.user_id,
            option: b.option,
            points: b.points,
        }
    }
}
