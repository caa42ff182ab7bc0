// Civic issue schema - single table for Diesel ORM

diesel::table! {
    issues (id) {
        id -> Integer,
        title -> Text,
        description -> Text,
        category -> Text,
        status -> Text,
        priority -> Text,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        address -> Nullable<Text>,
        image_path -> Nullable<Text>,      // Filename only, relative to the upload dir
        reporter_name -> Nullable<Text>,
        reporter_email -> Nullable<Text>,
        reporter_phone -> Nullable<Text>,
        created_at -> Text,                // RFC 3339, UTC
        updated_at -> Text,
        admin_notes -> Nullable<Text>,
    }
}
