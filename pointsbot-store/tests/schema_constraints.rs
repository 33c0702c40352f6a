mod common;

use common::TestDb;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Nullable, Text};
use pointsbot_store::storage::StorageError;
use pointsbot_store::storage::schema::{prediction_bets, predictions, reservations, users};

fn violation(res: QueryResult<usize>) -> DatabaseErrorKind {
    match res {
        Err(DieselError::DatabaseError(kind, _)) => kind,
        other => panic!("expected a constraint violation, got {other:?}"),
    }
}

fn insert_prediction(conn: &mut SqliteConnection, id: i32) {
    diesel::sql_query(format!(
        "INSERT INTO predictions (id, creator_id, title, option_a, option_b, thread_id, message_id) \
         VALUES ({id}, 1, 'title', 'A', 'B', 10, 20)"
    ))
    .execute(conn)
    .unwrap();
}

#[derive(Debug, PartialEq, QueryableByName)]
struct SchemaObject {
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    sql: Option<String>,
}

fn schema_objects(conn: &mut SqliteConnection) -> Vec<SchemaObject> {
    diesel::sql_query(
        "SELECT type AS kind, name, sql FROM sqlite_master \
         WHERE name NOT IN ('sqlite_sequence', '__diesel_schema_migrations') ORDER BY name",
    )
    .load(conn)
    .unwrap()
}

fn row_counts(conn: &mut SqliteConnection) -> [i64; 4] {
    [
        users::table.count().get_result(conn).unwrap(),
        reservations::table.count().get_result(conn).unwrap(),
        predictions::table.count().get_result(conn).unwrap(),
        prediction_bets::table.count().get_result(conn).unwrap(),
    ]
}

#[tokio::test]
async fn duplicate_discordid_is_rejected() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    let insert = "INSERT INTO users (discordid, points) VALUES (42, 0)";
    diesel::sql_query(insert).execute(&mut conn).unwrap();
    let kind = violation(diesel::sql_query(insert).execute(&mut conn));
    assert!(matches!(kind, DatabaseErrorKind::UniqueViolation), "{kind:?}");
}

#[tokio::test]
async fn points_default_to_zero_and_may_go_negative() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    diesel::sql_query("INSERT INTO users (discordid) VALUES (7)")
        .execute(&mut conn)
        .unwrap();
    assert_eq!(db.store.balance(7).await.unwrap(), 0);
    assert!(db.store.adjust_points(7, -15).await.unwrap());
    assert_eq!(db.store.balance(7).await.unwrap(), -15);
}

#[tokio::test]
async fn duplicate_bet_pair_is_rejected() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    insert_prediction(&mut conn, 1);
    let insert =
        "INSERT INTO prediction_bets (prediction_id, user_id, option, points) VALUES (1, 99, 'A', 5)";
    diesel::sql_query(insert).execute(&mut conn).unwrap();
    let kind = violation(diesel::sql_query(insert).execute(&mut conn));
    assert!(matches!(kind, DatabaseErrorKind::UniqueViolation), "{kind:?}");

    // Same user on another prediction is fine.
    insert_prediction(&mut conn, 2);
    diesel::sql_query(
        "INSERT INTO prediction_bets (prediction_id, user_id, option, points) VALUES (2, 99, 'B', 5)",
    )
    .execute(&mut conn)
    .unwrap();
}

#[tokio::test]
async fn bet_on_unknown_prediction_is_a_foreign_key_violation() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    let kind = violation(
        diesel::sql_query(
            "INSERT INTO prediction_bets (prediction_id, user_id, option, points) \
             VALUES (999, 1, 'A', 5)",
        )
        .execute(&mut conn),
    );
    assert!(
        matches!(kind, DatabaseErrorKind::ForeignKeyViolation),
        "{kind:?}"
    );

    let err = db.store.place_bet(999, 1, "A", 5).await.unwrap_err();
    assert!(
        matches!(
            err.violation(),
            Some(DatabaseErrorKind::ForeignKeyViolation)
        ),
        "{err}"
    );
}

#[tokio::test]
async fn deleting_prediction_cascades_to_bets() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    insert_prediction(&mut conn, 1);
    insert_prediction(&mut conn, 2);
    conn.batch_execute(
        "INSERT INTO prediction_bets (prediction_id, user_id, option, points) VALUES (1, 10, 'A', 5);
         INSERT INTO prediction_bets (prediction_id, user_id, option, points) VALUES (1, 11, 'B', 7);
         INSERT INTO prediction_bets (prediction_id, user_id, option, points) VALUES (2, 10, 'A', 3);",
    )
    .unwrap();

    assert!(db.store.delete_prediction(1).await.unwrap());

    let remaining: Vec<i32> = prediction_bets::table
        .select(prediction_bets::prediction_id)
        .load(&mut conn)
        .unwrap();
    assert_eq!(remaining, vec![2]);
    assert!(db.store.bets_for_prediction(1).await.unwrap().is_empty());
    assert!(!db.store.delete_prediction(1).await.unwrap());
}

#[tokio::test]
async fn reservation_requires_core_columns() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    let columns = [
        ("team", "'Varsity'"),
        ("pcs", "'[1,2]'"),
        ("start_time", "'2025-06-01 18:00:00'"),
        ("end_time", "'2025-06-01 20:00:00'"),
        ("manager", "'sam'"),
    ];
    for skip in 0..columns.len() {
        let (names, values): (Vec<_>, Vec<_>) = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, c)| *c)
            .unzip();
        let sql = format!(
            "INSERT INTO reservations ({}) VALUES ({})",
            names.join(", "),
            values.join(", ")
        );
        let kind = violation(diesel::sql_query(&sql).execute(&mut conn));
        assert!(
            matches!(kind, DatabaseErrorKind::NotNullViolation),
            "omitting {} gave {kind:?}",
            columns[skip].0
        );
    }

    // All five present: prime_time and created_at fall back to their defaults.
    let (names, values): (Vec<_>, Vec<_>) = columns.iter().copied().unzip();
    diesel::sql_query(format!(
        "INSERT INTO reservations ({}) VALUES ({})",
        names.join(", "),
        values.join(", ")
    ))
    .execute(&mut conn)
    .unwrap();
    let stored = db.store.list_reservations().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].prime_time);
    assert_eq!(stored[0].pcs, vec![1, 2]);
}

#[tokio::test]
async fn schema_accepts_empty_pcs_and_backwards_times() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    diesel::sql_query(
        "INSERT INTO reservations (team, pcs, start_time, end_time, manager) \
         VALUES ('JV', '[]', '2025-06-01 20:00:00', '2025-06-01 18:00:00', 'kim'), \
                ('JV', '[3,3]', '2025-06-02 18:00:00', '2025-06-02 19:00:00', 'kim')",
    )
    .execute(&mut conn)
    .unwrap();
    let stored = db.store.list_reservations().await.unwrap();
    assert_eq!(stored[0].pcs, Vec::<i32>::new());
    assert!(stored[0].end_time < stored[0].start_time);
    assert_eq!(stored[1].pcs, vec![3, 3]);
}

#[tokio::test]
async fn status_is_free_text_in_the_schema() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    insert_prediction(&mut conn, 1);
    let default_status: String = predictions::table
        .find(1)
        .select(predictions::status)
        .first(&mut conn)
        .unwrap();
    assert_eq!(default_status, "active");

    diesel::sql_query("UPDATE predictions SET status = 'paused' WHERE id = 1")
        .execute(&mut conn)
        .unwrap();
    let err = db.store.get_prediction(1).await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt(_)), "{err}");
}

#[tokio::test]
async fn prediction_detail_columns_are_nullable() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    diesel::sql_query("INSERT INTO predictions (id) VALUES (1)")
        .execute(&mut conn)
        .unwrap();
    let title: Option<String> = predictions::table
        .find(1)
        .select(predictions::title)
        .first(&mut conn)
        .unwrap();
    assert_eq!(title, None);

    let err = db.store.get_prediction(1).await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt(_)), "{err}");
}

#[tokio::test]
async fn reset_empties_tables_and_keeps_structure() {
    let db = TestDb::new().await;
    let mut conn = db.raw();
    let fresh = schema_objects(&mut conn);
    assert_eq!(
        fresh
            .iter()
            .filter(|o| o.kind == "table")
            .map(|o| o.name.as_str())
            .collect::<Vec<_>>(),
        vec!["prediction_bets", "predictions", "reservations", "users"]
    );

    db.store.award_points(&[(1, 50), (2, 75)]).await.unwrap();
    let p = db.start(1, "A", "B").await;
    db.store.place_wager(p.id, 1, "A", 10).await.unwrap();
    conn.batch_execute(
        "INSERT INTO reservations (team, pcs, start_time, end_time, manager) \
         VALUES ('Varsity', '[1]', '2025-06-01 18:00:00', '2025-06-01 20:00:00', 'sam')",
    )
    .unwrap();
    assert_eq!(row_counts(&mut conn), [2, 1, 1, 1]);

    db.store.reset_schema().await.unwrap();
    assert_eq!(row_counts(&mut conn), [0, 0, 0, 0]);
    assert_eq!(schema_objects(&mut conn), fresh);

    // Running it again, and against missing tables, changes nothing.
    db.store.reset_schema().await.unwrap();
    assert_eq!(schema_objects(&mut conn), fresh);
    conn.batch_execute("DROP TABLE prediction_bets; DROP TABLE users;")
        .unwrap();
    db.store.reset_schema().await.unwrap();
    assert_eq!(schema_objects(&mut conn), fresh);

    // Surrogate keys start over.
    let p = db.start(3, "A", "B").await;
    assert_eq!(p.id, 1);
}
