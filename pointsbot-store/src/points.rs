use std::collections::HashMap;
use std::ops::RangeInclusive;

use pointsbot_shared::DiscordId;
use rand::Rng;
use tracing::debug;

use crate::storage::{StorageError, Store};

/// Pending activity awards, flushed to the database in one batch.
///
/// A user earns at most one award per flush: later activity replaces the
/// pending award with a fresh roll instead of adding to it.
#[derive(Debug)]
pub struct PointsBuffer {
    range: RangeInclusive<i32>,
    pending: HashMap<DiscordId, i32>,
}

impl PointsBuffer {
    pub fn new(range: RangeInclusive<i32>) -> Self {
        Self {
            range,
            pending: HashMap::new(),
        }
    }

    /// Rolls an award for `user` and returns it.
    pub fn record_activity<R: Rng>(&mut self, user: DiscordId, rng: &mut R) -> i32 {
        let award = rng.gen_range(self.range.clone());
        self.pending.insert(user, award);
        award
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<(DiscordId, i32)> {
        let mut batch: Vec<_> = self.pending.drain().collect();
        batch.sort_unstable();
        batch
    }

    /// Credits every pending award and empties the buffer. Returns the number
    /// of users credited.
    ///
    /// The buffer is only cleared once the batch is written, so a failed
    /// flush keeps its awards for the next attempt.
    pub async fn flush(&mut self, store: &Store) -> Result<usize, StorageError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let mut batch: Vec<_> = self.pending.iter().map(|(&u, &p)| (u, p)).collect();
        batch.sort_unstable();
        let credited = store.award_points(&batch).await?;
        self.pending.clear();
        debug!(credited, "flushed activity points");
        Ok(credited)
    }
}
