use std::collections::HashMap;

use diesel::prelude::*;
use pointsbot_shared::{DiscordId, User};
use tracing::trace;

use super::models::{self, NewUser};
use super::schema::users;
use super::{StorageError, Store};

impl Store {
    pub async fn get_user(&self, discord_id: DiscordId) -> Result<Option<User>, StorageError> {
        self.with_conn(move |conn| {
            let row = users::table
                .find(discord_id)
                .first::<models::User>(conn)
                .optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    /// Point balance of a user; users without a row have zero points.
    pub async fn balance(&self, discord_id: DiscordId) -> Result<i32, StorageError> {
        self.with_conn(move |conn| load_balance(conn, discord_id)).await
    }

    /// Adds each award to the user's balance, creating missing users.
    ///
    /// Nothing is written when any resulting balance would leave the `i32`
    /// range.
    pub async fn award_points(&self, awards: &[(DiscordId, i32)]) -> Result<usize, StorageError> {
        if awards.is_empty() {
            return Ok(0);
        }
        let awards = awards.to_vec();
        self.with_conn(move |conn| {
            credit_points(conn, &awards, true)?;
            Ok(awards.len())
        })
        .await
    }

    /// Adds `delta` (possibly negative) to an existing user's balance.
    ///
    /// Returns `false` without creating a row when the user is unknown.
    pub async fn adjust_points(
        &self,
        discord_id: DiscordId,
        delta: i32,
    ) -> Result<bool, StorageError> {
        self.with_conn(move |conn| Ok(credit_points(conn, &[(discord_id, delta)], false)? > 0))
            .await
    }

    pub async fn list_top_users(&self, limit: i64) -> Result<Vec<User>, StorageError> {
        let limit = limit.clamp(1, 1000);
        self.with_conn(move |conn| {
            Ok(users::table
                .order((users::points.desc(), users::discordid.asc()))
                .limit(limit)
                .load::<models::User>(conn)?
                .into_iter()
                .map(User::from)
                .collect())
        })
        .await
    }
}

pub(super) fn load_balance(
    conn: &mut SqliteConnection,
    discord_id: DiscordId,
) -> Result<i32, StorageError> {
    Ok(users::table
        .find(discord_id)
        .select(users::points)
        .first::<i32>(conn)
        .optional()?
        .unwrap_or(0))
}

/// Applies point deltas in order and returns how many of them were written.
///
/// Every resulting balance is checked before the first write, so an overflow
/// leaves all rows as they were. Unknown users are created only when
/// `create_missing` is set and skipped otherwise.
pub(super) fn credit_points(
    conn: &mut SqliteConnection,
    credits: &[(DiscordId, i32)],
    create_missing: bool,
) -> Result<usize, StorageError> {
    // Balance each user would end up with; `None` when there is no row.
    let mut balances: HashMap<DiscordId, Option<i32>> = HashMap::new();
    for &(discord_id, delta) in credits {
        let current = match balances.get(&discord_id) {
            Some(current) => *current,
            None => users::table
                .find(discord_id)
                .select(users::points)
                .first::<i32>(conn)
                .optional()?,
        };
        let next = match current {
            None if !create_missing => None,
            _ => {
                let balance = current.unwrap_or(0);
                Some(balance.checked_add(delta).ok_or(StorageError::PointsOverflow {
                    discord_id,
                    balance,
                    delta,
                })?)
            }
        };
        balances.insert(discord_id, next);
    }

    let mut written = 0;
    for &(discordid, delta) in credits {
        if balances.get(&discordid).copied().flatten().is_none() {
            trace!(discordid, delta, "skipping unknown user");
            continue;
        }
        trace!(discordid, delta, "crediting points");
        // Rows whose new balance would leave the i32 range are not matched.
        let updated = diesel::update(
            users::table
                .find(discordid)
                .filter((users::points + delta).between(i32::MIN, i32::MAX)),
        )
        .set(users::points.eq(users::points + delta))
        .execute(conn)?;
        if updated == 0 {
            if create_missing && !user_exists(conn, discordid)? {
                diesel::insert_into(users::table)
                    .values(&NewUser {
                        discordid,
                        points: delta,
                    })
                    .execute(conn)?;
            } else {
                return Err(StorageError::PointsOverflow {
                    discord_id: discordid,
                    balance: load_balance(conn, discordid)?,
                    delta,
                });
            }
        }
        written += 1;
    }
    Ok(written)
}

fn user_exists(conn: &mut SqliteConnection, discord_id: DiscordId) -> Result<bool, StorageError> {
    Ok(diesel::select(diesel::dsl::exists(users::table.find(discord_id))).get_result(conn)?)
}

pub(super) fn debit_points(
    conn: &mut SqliteConnection,
    discord_id: DiscordId,
    points: i32,
) -> Result<(), StorageError> {
    let delta = points.checked_neg().ok_or_else(|| {
        StorageError::InvalidInput(format!("cannot debit {points} points"))
    })?;
    credit_points(conn, &[(discord_id, delta)], false)?;
    Ok(())
}
