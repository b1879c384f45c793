//! Table bootstrap for the four entity kinds.
//!
//! The identifier column type follows the key kind of the stores:
//!
//! | Key kind  | Column                                      |
//! |-----------|---------------------------------------------|
//! | `Integer` | `BIGINT GENERATED BY DEFAULT AS IDENTITY`   |
//! | `Uuid`    | `UUID DEFAULT gen_random_uuid()`            |
//! | `Text`    | `TEXT DEFAULT gen_random_uuid()::text`      |
//!
//! Foreign keys carry no cascade actions; the stores delete dependents
//! explicitly inside their transactions.

use authstore_core::KeyKind;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

pub const APPLICATIONS_TABLE: &str = "oauth_applications";
pub const AUTHORIZATIONS_TABLE: &str = "oauth_authorizations";
pub const SCOPES_TABLE: &str = "oauth_scopes";
pub const TOKENS_TABLE: &str = "oauth_tokens";

fn key_column(kind: KeyKind) -> &'static str {
    match kind {
        KeyKind::Integer => "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
        KeyKind::Uuid => "UUID PRIMARY KEY DEFAULT gen_random_uuid()",
        KeyKind::Text => "TEXT PRIMARY KEY DEFAULT gen_random_uuid()::text",
    }
}

fn reference_type(kind: KeyKind) -> &'static str {
    match kind {
        KeyKind::Integer => "BIGINT",
        KeyKind::Uuid => "UUID",
        KeyKind::Text => "TEXT",
    }
}

/// Returns the DDL statements creating the tables and their indexes.
#[must_use]
pub fn schema_statements(kind: KeyKind) -> Vec<String> {
    let id = key_column(kind);
    let reference = reference_type(kind);

    vec![
        format!(
            r#"CREATE TABLE IF NOT EXISTS {APPLICATIONS_TABLE} (
    id {id},
    application_type TEXT,
    client_id TEXT UNIQUE,
    client_secret TEXT,
    client_type TEXT,
    concurrency_token TEXT,
    consent_type TEXT,
    display_name TEXT,
    display_names TEXT,
    json_web_key_set TEXT,
    permissions TEXT,
    post_logout_redirect_uris TEXT,
    properties TEXT,
    redirect_uris TEXT,
    requirements TEXT,
    settings TEXT
)"#
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {AUTHORIZATIONS_TABLE} (
    id {id},
    application_id {reference} REFERENCES {APPLICATIONS_TABLE} (id),
    concurrency_token TEXT,
    creation_date TIMESTAMPTZ,
    properties TEXT,
    scopes TEXT,
    status TEXT,
    subject TEXT,
    type TEXT
)"#
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {SCOPES_TABLE} (
    id {id},
    concurrency_token TEXT,
    description TEXT,
    descriptions TEXT,
    display_name TEXT,
    display_names TEXT,
    name TEXT UNIQUE,
    properties TEXT,
    resources TEXT
)"#
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {TOKENS_TABLE} (
    id {id},
    application_id {reference} REFERENCES {APPLICATIONS_TABLE} (id),
    authorization_id {reference} REFERENCES {AUTHORIZATIONS_TABLE} (id),
    concurrency_token TEXT,
    creation_date TIMESTAMPTZ,
    expiration_date TIMESTAMPTZ,
    payload TEXT,
    properties TEXT,
    redemption_date TIMESTAMPTZ,
    reference_id TEXT UNIQUE,
    status TEXT,
    subject TEXT,
    type TEXT
)"#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS ix_{AUTHORIZATIONS_TABLE}_lookup \
             ON {AUTHORIZATIONS_TABLE} (application_id, status, subject, type)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS ix_{TOKENS_TABLE}_lookup \
             ON {TOKENS_TABLE} (application_id, status, subject, type)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS ix_{TOKENS_TABLE}_authorization \
             ON {TOKENS_TABLE} (authorization_id)"
        ),
    ]
}

/// Creates the four tables if they do not exist yet.
///
/// # Errors
///
/// Returns `PostgresError::Schema` if a statement fails.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool, kind: KeyKind) -> Result<()> {
    let statements = schema_statements(kind);
    let mut tx = pool.begin().await?;

    for statement in &statements {
        sqlx_core::query::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| PostgresError::Schema(e.to_string()))?;
        debug!(statement = %statement.lines().next().unwrap_or_default(), "Applied DDL");
    }

    tx.commit().await?;
    info!(statements = statements.len(), "Store schema is ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_column_follows_kind() {
        let integer = schema_statements(KeyKind::Integer);
        assert!(integer[0].contains("id BIGINT GENERATED BY DEFAULT AS IDENTITY"));
        assert!(integer[1].contains("application_id BIGINT REFERENCES oauth_applications"));

        let uuid = schema_statements(KeyKind::Uuid);
        assert!(uuid[0].contains("id UUID PRIMARY KEY"));
        assert!(uuid[3].contains("authorization_id UUID REFERENCES oauth_authorizations"));

        let text = schema_statements(KeyKind::Text);
        assert!(text[2].contains("id TEXT PRIMARY KEY"));
    }

    #[test]
    fn test_unique_columns() {
        let statements = schema_statements(KeyKind::Integer);
        assert!(statements[0].contains("client_id TEXT UNIQUE"));
        assert!(statements[2].contains("name TEXT UNIQUE"));
        assert!(statements[3].contains("reference_id TEXT UNIQUE"));
    }

    #[test]
    fn test_foreign_keys_do_not_cascade() {
        for statement in schema_statements(KeyKind::Uuid) {
            assert!(!statement.contains("ON DELETE CASCADE"));
        }
    }
}
