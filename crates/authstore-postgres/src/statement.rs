//! SQL statements issued by [`crate::PostgresSession`].
//!
//! Every statement binds its values; nothing caller-supplied is spliced into
//! the SQL text. Updates and deletes are guarded by the concurrency token the
//! caller loaded, so a stale write affects no row.

use authstore_core::{EntityKey, Query};
use sqlx_core::query_builder::QueryBuilder;
use sqlx_postgres::Postgres;

use crate::mapping::{Param, PgEntity};

const TOKEN_GUARD: &str = " AND concurrency_token IS NOT DISTINCT FROM ";

fn push_where<E: PgEntity>(builder: &mut QueryBuilder<'static, Postgres>, filters: &[E::Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        E::push_filter(filter, builder);
    }
}

fn window(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `SELECT` of the matching rows ordered by identifier.
pub fn select<E: PgEntity>(query: &Query<E>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT id, {} FROM {}",
        E::COLUMNS.join(", "),
        E::TABLE
    ));
    push_where::<E>(&mut builder, query.filters());
    builder.push(" ORDER BY id");

    if let Some(limit) = query.get_limit() {
        builder.push(" LIMIT ");
        builder.push_bind(window(limit));
    }
    if let Some(offset) = query.get_offset() {
        builder.push(" OFFSET ");
        builder.push_bind(window(offset));
    }
    builder
}

pub fn count<E: PgEntity>(query: &Query<E>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_where::<E>(&mut builder, query.filters());
    builder
}

pub fn delete_where<E: PgEntity>(query: &Query<E>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", E::TABLE));
    push_where::<E>(&mut builder, query.filters());
    builder
}

/// `INSERT` returning the identifier. A non-default identifier already set
/// on the entity is inserted as is.
pub fn insert<E: PgEntity>(entity: &E) -> QueryBuilder<'static, Postgres> {
    let explicit_id = entity.id().filter(|id| !id.is_default());

    let mut columns = E::COLUMNS.join(", ");
    if explicit_id.is_some() {
        columns.push_str(", id");
    }

    let mut builder = QueryBuilder::new(format!("INSERT INTO {} ({columns}) VALUES (", E::TABLE));
    for (i, value) in entity.values().into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        value.push_bind(&mut builder);
    }
    if let Some(id) = explicit_id {
        builder.push(", ");
        Param::key(Some(id)).push_bind(&mut builder);
    }
    builder.push(") RETURNING id");
    builder
}

pub fn update<E: PgEntity>(
    entity: &E,
    id: &E::Key,
    expected_token: Option<&str>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
    for (i, (column, value)) in E::COLUMNS.iter().zip(entity.values()).enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(format!("{column} = "));
        value.push_bind(&mut builder);
    }
    push_guard(&mut builder, id, expected_token);
    builder
}

pub fn delete<E: PgEntity>(
    id: &E::Key,
    expected_token: Option<&str>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", E::TABLE));
    push_guard(&mut builder, id, expected_token);
    builder
}

fn push_guard<K: EntityKey>(
    builder: &mut QueryBuilder<'static, Postgres>,
    id: &K,
    expected_token: Option<&str>,
) {
    builder.push(" WHERE id = ");
    Param::key(Some(id)).push_bind(builder);
    builder.push(TOKEN_GUARD);
    Param::Text(expected_token.map(str::to_owned)).push_bind(builder);
}

#[cfg(test)]
mod tests {
    use super::*;
    use authstore_core::{Scope, ScopeFilter, Token, TokenFilter};

    #[test]
    fn test_select_with_window() {
        let query = Query::<Scope<i64>>::new()
            .filter(ScopeFilter::Name("email".into()))
            .offset(5)
            .limit(10);
        let builder = select(&query);
        assert_eq!(
            builder.sql(),
            "SELECT id, concurrency_token, description, descriptions, display_name, \
             display_names, name, properties, resources FROM oauth_scopes \
             WHERE oauth_scopes.name = $1 ORDER BY id LIMIT $2 OFFSET $3"
        );
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let query = Query::<Token<i64>>::new()
            .filter(TokenFilter::ApplicationId(7))
            .filter(TokenFilter::WithoutAuthorization);
        assert_eq!(
            delete_where(&query).sql(),
            "DELETE FROM oauth_tokens WHERE oauth_tokens.application_id = $1 \
             AND oauth_tokens.authorization_id IS NULL"
        );
        assert_eq!(
            count(&Query::<Token<i64>>::new()).sql(),
            "SELECT COUNT(*) FROM oauth_tokens"
        );
    }

    #[test]
    fn test_insert_returns_identifier() {
        let scope = Scope::<i64>::default();
        let sql = insert(&scope).sql().to_string();
        assert!(sql.starts_with("INSERT INTO oauth_scopes (concurrency_token,"));
        assert!(sql.ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"));
        assert!(!sql.contains(", id)"));
    }

    #[test]
    fn test_guarded_update_and_delete() {
        let scope = Scope::<i64>::default();
        let sql = update(&scope, &3, Some("token")).sql().to_string();
        assert!(sql.starts_with("UPDATE oauth_scopes SET concurrency_token = $1, description = $2"));
        assert!(sql.ends_with("WHERE id = $9 AND concurrency_token IS NOT DISTINCT FROM $10"));

        assert_eq!(
            delete::<Scope<i64>>(&3, None).sql(),
            "DELETE FROM oauth_scopes WHERE id = $1 AND concurrency_token IS NOT DISTINCT FROM $2"
        );
    }
}
