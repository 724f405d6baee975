// @generated — mirrors migrations/2024-01-01-000000_init/up.sql.

diesel::table! {
    commands (id) {
        id -> BigInt,
        ts -> Text,
        source -> Text,
        command -> Text,
        arguments_json -> Text,
        result_code -> Text,
        request_id -> Text,
    }
}

diesel::table! {
    orders (client_order_id) {
        client_order_id -> Text,
        broker_order_id -> Nullable<Text>,
        symbol -> Text,
        side -> Text,
        qty -> Text,
        order_type -> Text,
        limit_price -> Nullable<Text>,
        stop_price -> Nullable<Text>,
        tif -> Text,
        status -> Text,
        submitted_at -> Nullable<Text>,
        filled_at -> Nullable<Text>,
        fill_qty -> Text,
        fill_price -> Nullable<Text>,
        commission -> Text,
        risk_check_result_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    fills (fill_id) {
        fill_id -> Text,
        client_order_id -> Text,
        symbol -> Text,
        qty -> Text,
        price -> Text,
        commission -> Text,
        ts -> Text,
        broker_order_id -> Nullable<Text>,
    }
}

diesel::table! {
    risk_events (id) {
        id -> BigInt,
        ts -> Text,
        event_type -> Text,
        details_json -> Text,
    }
}

diesel::table! {
    connection_events (id) {
        id -> BigInt,
        ts -> Text,
        event -> Text,
        details_json -> Text,
    }
}
