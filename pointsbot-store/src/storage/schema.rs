// Mirrors migrations/2025-06-01-000000_create_points_schema/up.sql
diesel::table! {
    users (discordid) {
        discordid -> BigInt,
        points -> Integer,
    }
}

diesel::table! {
    reservations (id) {
        id -> Integer,
        team -> Text,
        pcs -> Text,
        start_time -> Timestamp,
        end_time -> Timestamp,
        manager -> Text,
        prime_time -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    predictions (id) {
        id -> Integer,
        creator_id -> Nullable<BigInt>,
        title -> Nullable<Text>,
        option_a -> Nullable<Text>,
        option_b -> Nullable<Text>,
        status -> Text,
        winner -> Nullable<Text>,
        thread_id -> Nullable<BigInt>,
        message_id -> Nullable<BigInt>,
    }
}

diesel::table! {
    prediction_bets (id) {
        id -> Integer,
        prediction_id -> Integer,
        user_id -> BigInt,
        option -> Text,
        points -> Integer,
    }
}

diesel::joinable!(prediction_bets -> predictions (prediction_id));

diesel::allow_tables_to_appear_in_same_query!(users, reservations, predictions, prediction_bets,);
