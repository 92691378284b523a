//! Database migrations - embedded SQL files
//!
//! Each migration is a (name, sql) pair compiled in with include_str! and
//! applied in name order by [`crate::services::MigrationService`].

/// Archive database migrations. Append new entries in order as
/// `NNN_description.sql`.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
