#![allow(dead_code)]

use std::path::PathBuf;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use pointsbot_shared::{DiscordId, NewPrediction, Prediction};
use pointsbot_store::storage::Store;

pub struct TestDb {
    pub store: Store,
    pub path: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.db");
        let store = Store::connect_sqlite(path.to_str().unwrap())
            .await
            .expect("db");
        Self {
            store,
            path,
            _tempdir: dir,
        }
    }

    /// A connection outside the store, for statements the store never issues.
    pub fn raw(&self) -> SqliteConnection {
        let mut conn = SqliteConnection::establish(self.path.to_str().unwrap()).unwrap();
        conn.batch_execute("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
            .unwrap();
        conn
    }

    pub async fn start(&self, creator_id: DiscordId, option_a: &str, option_b: &str) -> Prediction {
        self.store
            .start_prediction(&NewPrediction {
                creator_id,
                title: format!("{option_a} or {option_b}?"),
                option_a: option_a.into(),
                option_b: option_b.into(),
                thread_id: 5_000 + creator_id,
                message_id: 6_000 + creator_id,
            })
            .await
            .unwrap()
    }
}
