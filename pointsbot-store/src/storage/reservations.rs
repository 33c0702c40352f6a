use chrono::{DateTime, Utc};
use diesel::prelude::*;
use pointsbot_shared::{NewReservation, Reservation};
use tracing::info;

use super::models::{self, Pcs};
use super::schema::reservations;
use super::{StorageError, Store};

impl Store {
    /// Books a reservation.
    ///
    /// The table accepts an empty PC list and an end before the start; both
    /// are rejected here instead.
    pub async fn create_reservation(
        &self,
        new: &NewReservation,
    ) -> Result<Reservation, StorageError> {
        if new.pcs.is_empty() {
            return Err(StorageError::InvalidInput(
                "a reservation needs at least one pc".to_string(),
            ));
        }
        if new.end_time <= new.start_time {
            return Err(StorageError::InvalidInput(format!(
                "reservation ends at {} which is not after its start {}",
                new.end_time, new.start_time
            )));
        }
        let new = new.clone();
        self.with_conn(move |conn| {
            let row = diesel::insert_into(reservations::table)
                .values(&models::NewReservation {
                    team: &new.team,
                    pcs: Pcs(new.pcs.clone()),
                    start_time: new.start_time.naive_utc(),
                    end_time: new.end_time.naive_utc(),
                    manager: &new.manager,
                    prime_time: new.prime_time,
                })
                .returning(models::Reservation::as_returning())
                .get_result::<models::Reservation>(conn)?;
            info!(id = row.id, team = %row.team, "reservation created");
            Ok(Reservation::from(row))
        })
        .await
    }

    pub async fn get_reservation(&self, id: i32) -> Result<Option<Reservation>, StorageError> {
        self.with_conn(move |conn| {
            Ok(reservations::table
                .find(id)
                .first::<models::Reservation>(conn)
                .optional()?
                .map(Reservation::from))
        })
        .await
    }

    pub async fn list_reservations(&self) -> Result<Vec<Reservation>, StorageError> {
        self.with_conn(|conn| {
            Ok(reservations::table
                .order((reservations::start_time.asc(), reservations::id.asc()))
                .load::<models::Reservation>(conn)?
                .into_iter()
                .map(Reservation::from)
                .collect())
        })
        .await
    }

    /// Reservations overlapping the half-open window `[from, to)`.
    pub async fn list_reservations_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StorageError> {
        if to <= from {
            return Ok(Vec::new());
        }
        let (from, to) = (from.naive_utc(), to.naive_utc());
        self.with_conn(move |conn| {
            Ok(reservations::table
                .filter(reservations::start_time.lt(to))
                .filter(reservations::end_time.gt(from))
                .order((reservations::start_time.asc(), reservations::id.asc()))
                .load::<models::Reservation>(conn)?
                .into_iter()
                .map(Reservation::from)
                .collect())
        })
        .await
    }

    pub async fn delete_reservation(&self, id: i32) -> Result<bool, StorageError> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(reservations::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}
