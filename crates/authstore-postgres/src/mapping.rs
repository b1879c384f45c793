//! Row mapping and SQL filter translation per entity kind.

use authstore_core::{
    Application, ApplicationFilter, Authorization, AuthorizationFilter, Entity, EntityKey,
    KeyKind, KeyValue, Scope, ScopeFilter, StoreResult, Token, TokenFilter,
};
use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};
use time::OffsetDateTime;

use crate::error::map_sqlx;
use crate::schema::{APPLICATIONS_TABLE, AUTHORIZATIONS_TABLE, SCOPES_TABLE, TOKENS_TABLE};

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(Option<String>),
    Timestamp(Option<OffsetDateTime>),
    TextArray(Vec<String>),
    /// A key column; the kind types the parameter when the value is `NULL`.
    Key(KeyKind, Option<KeyValue>),
}

impl Param {
    pub fn key<K: EntityKey>(key: Option<&K>) -> Self {
        Param::Key(K::KIND, key.map(EntityKey::to_value))
    }

    /// Appends the value as a bound parameter.
    pub fn push_bind(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Param::Text(value) => builder.push_bind(value),
            Param::Timestamp(value) => builder.push_bind(value),
            Param::TextArray(values) => builder.push_bind(values),
            Param::Key(_, Some(KeyValue::Integer(v))) => builder.push_bind(v),
            Param::Key(_, Some(KeyValue::Uuid(v))) => builder.push_bind(v),
            Param::Key(_, Some(KeyValue::Text(v))) => builder.push_bind(v),
            Param::Key(KeyKind::Integer, None) => builder.push_bind(None::<i64>),
            Param::Key(KeyKind::Uuid, None) => builder.push_bind(None::<uuid::Uuid>),
            Param::Key(KeyKind::Text, None) => builder.push_bind(None::<String>),
        };
    }
}

/// An entity kind persisted in its own table.
pub trait PgEntity: Entity {
    const TABLE: &'static str;

    /// Non-key columns, in the order of [`PgEntity::values`].
    const COLUMNS: &'static [&'static str];

    /// Column values in the order of [`PgEntity::COLUMNS`].
    fn values(&self) -> Vec<Param>;

    /// Builds the entity from a row selected with `id` and every column.
    fn from_row(row: &PgRow) -> StoreResult<Self>;

    /// Appends a boolean SQL expression for the filter.
    fn push_filter(filter: &Self::Filter, builder: &mut QueryBuilder<'_, Postgres>);
}

// =============================================================================
// Helpers
// =============================================================================

fn text<E: Entity>(row: &PgRow, column: &str) -> StoreResult<Option<String>> {
    row.try_get(column).map_err(|e| map_sqlx(E::NAME, e))
}

fn timestamp<E: Entity>(row: &PgRow, column: &str) -> StoreResult<Option<OffsetDateTime>> {
    row.try_get(column).map_err(|e| map_sqlx(E::NAME, e))
}

/// Reads a key column according to the key kind.
pub fn read_key<E: Entity>(row: &PgRow, column: &str) -> StoreResult<Option<E::Key>> {
    let value = match E::Key::KIND {
        KeyKind::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map(|v| v.map(KeyValue::Integer)),
        KeyKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(column)
            .map(|v| v.map(KeyValue::Uuid)),
        KeyKind::Text => row
            .try_get::<Option<String>, _>(column)
            .map(|v| v.map(KeyValue::Text)),
    }
    .map_err(|e| map_sqlx(E::NAME, e))?;

    value.map(E::Key::from_value).transpose()
}

fn read_id<E: Entity>(row: &PgRow, entity: &mut E) -> StoreResult<()> {
    if let Some(id) = read_key::<E>(row, "id")? {
        entity.assign_id(id);
    }
    Ok(())
}

/// Escapes `LIKE` wildcards and wraps the value for a substring match.
pub fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_compare(
    builder: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    column: &str,
    op: &str,
    param: Param,
) {
    builder.push(format!("{table}.{column} {op} "));
    param.push_bind(builder);
}

fn push_contains(builder: &mut QueryBuilder<'_, Postgres>, table: &str, column: &str, value: &str) {
    builder.push(format!("{table}.{column} LIKE "));
    builder.push_bind(contains_pattern(value));
    builder.push(" ESCAPE '\\'");
}

fn push_any<F>(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[F],
    push: impl Fn(&F, &mut QueryBuilder<'_, Postgres>),
) {
    if filters.is_empty() {
        builder.push("FALSE");
        return;
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        push(filter, builder);
    }
    builder.push(")");
}

fn text_param(value: &str) -> Param {
    Param::Text(Some(value.to_string()))
}

// =============================================================================
// Application
// =============================================================================

impl<K: EntityKey> PgEntity for Application<K> {
    const TABLE: &'static str = APPLICATIONS_TABLE;

    const COLUMNS: &'static [&'static str] = &[
        "application_type",
        "client_id",
        "client_secret",
        "client_type",
        "concurrency_token",
        "consent_type",
        "display_name",
        "display_names",
        "json_web_key_set",
        "permissions",
        "post_logout_redirect_uris",
        "properties",
        "redirect_uris",
        "requirements",
        "settings",
    ];

    fn values(&self) -> Vec<Param> {
        vec![
            Param::Text(self.application_type.clone()),
            Param::Text(self.client_id.clone()),
            Param::Text(self.client_secret.clone()),
            Param::Text(self.client_type.clone()),
            Param::Text(self.concurrency_token.clone()),
            Param::Text(self.consent_type.clone()),
            Param::Text(self.display_name.clone()),
            Param::Text(self.display_names.clone()),
            Param::Text(self.json_web_key_set.clone()),
            Param::Text(self.permissions.clone()),
            Param::Text(self.post_logout_redirect_uris.clone()),
            Param::Text(self.properties.clone()),
            Param::Text(self.redirect_uris.clone()),
            Param::Text(self.requirements.clone()),
            Param::Text(self.settings.clone()),
        ]
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        let mut application = Self::default();
        application.application_type = text::<Self>(row, "application_type")?;
        application.client_id = text::<Self>(row, "client_id")?;
        application.client_secret = text::<Self>(row, "client_secret")?;
        application.client_type = text::<Self>(row, "client_type")?;
        application.concurrency_token = text::<Self>(row, "concurrency_token")?;
        application.consent_type = text::<Self>(row, "consent_type")?;
        application.display_name = text::<Self>(row, "display_name")?;
        application.display_names = text::<Self>(row, "display_names")?;
        application.json_web_key_set = text::<Self>(row, "json_web_key_set")?;
        application.permissions = text::<Self>(row, "permissions")?;
        application.post_logout_redirect_uris = text::<Self>(row, "post_logout_redirect_uris")?;
        application.properties = text::<Self>(row, "properties")?;
        application.redirect_uris = text::<Self>(row, "redirect_uris")?;
        application.requirements = text::<Self>(row, "requirements")?;
        application.settings = text::<Self>(row, "settings")?;
        read_id(row, &mut application)?;
        Ok(application)
    }

    fn push_filter(filter: &ApplicationFilter<K>, builder: &mut QueryBuilder<'_, Postgres>) {
        let table = Self::TABLE;
        match filter {
            ApplicationFilter::Id(id) => push_compare(builder, table, "id", "=", Param::key(Some(id))),
            ApplicationFilter::ClientId(client_id) => {
                push_compare(builder, table, "client_id", "=", text_param(client_id))
            }
            ApplicationFilter::RedirectUrisContain(uri) => {
                push_contains(builder, table, "redirect_uris", uri)
            }
            ApplicationFilter::PostLogoutRedirectUrisContain(uri) => {
                push_contains(builder, table, "post_logout_redirect_uris", uri)
            }
        }
    }
}

// =============================================================================
// Authorization
// =============================================================================

impl<K: EntityKey> PgEntity for Authorization<K> {
    const TABLE: &'static str = AUTHORIZATIONS_TABLE;

    const COLUMNS: &'static [&'static str] = &[
        "application_id",
        "concurrency_token",
        "creation_date",
        "properties",
        "scopes",
        "status",
        "subject",
        "type",
    ];

    fn values(&self) -> Vec<Param> {
        vec![
            Param::key(self.application_id.as_ref()),
            Param::Text(self.concurrency_token.clone()),
            Param::Timestamp(self.creation_date),
            Param::Text(self.properties.clone()),
            Param::Text(self.scopes.clone()),
            Param::Text(self.status.clone()),
            Param::Text(self.subject.clone()),
            Param::Text(self.authorization_type.clone()),
        ]
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        let mut authorization = Self::default();
        authorization.application_id = read_key::<Self>(row, "application_id")?;
        authorization.concurrency_token = text::<Self>(row, "concurrency_token")?;
        authorization.creation_date = timestamp::<Self>(row, "creation_date")?;
        authorization.properties = text::<Self>(row, "properties")?;
        authorization.scopes = text::<Self>(row, "scopes")?;
        authorization.status = text::<Self>(row, "status")?;
        authorization.subject = text::<Self>(row, "subject")?;
        authorization.authorization_type = text::<Self>(row, "type")?;
        read_id(row, &mut authorization)?;
        Ok(authorization)
    }

    fn push_filter(filter: &AuthorizationFilter<K>, builder: &mut QueryBuilder<'_, Postgres>) {
        let table = Self::TABLE;
        match filter {
            AuthorizationFilter::Id(id) => {
                push_compare(builder, table, "id", "=", Param::key(Some(id)))
            }
            AuthorizationFilter::ApplicationId(id) => {
                push_compare(builder, table, "application_id", "=", Param::key(Some(id)))
            }
            AuthorizationFilter::Subject(subject) => {
                push_compare(builder, table, "subject", "=", text_param(subject))
            }
            AuthorizationFilter::Status(status) => {
                push_compare(builder, table, "status", "=", text_param(status))
            }
            AuthorizationFilter::StatusNot(status) => {
                push_compare(builder, table, "status", "<>", text_param(status))
            }
            AuthorizationFilter::Type(kind) => {
                push_compare(builder, table, "type", "=", text_param(kind))
            }
            AuthorizationFilter::CreatedBefore(threshold) => push_compare(
                builder,
                table,
                "creation_date",
                "<",
                Param::Timestamp(Some(*threshold)),
            ),
            AuthorizationFilter::HasTokens => {
                builder.push(format!(
                    "EXISTS (SELECT 1 FROM {TOKENS_TABLE} t WHERE t.authorization_id = {table}.id)"
                ));
            }
            AuthorizationFilter::Any(filters) => push_any(builder, filters, Self::push_filter),
        }
    }
}

// =============================================================================
// Scope
// =============================================================================

impl<K: EntityKey> PgEntity for Scope<K> {
    const TABLE: &'static str = SCOPES_TABLE;

    const COLUMNS: &'static [&'static str] = &[
        "concurrency_token",
        "description",
        "descriptions",
        "display_name",
        "display_names",
        "name",
        "properties",
        "resources",
    ];

    fn values(&self) -> Vec<Param> {
        vec![
            Param::Text(self.concurrency_token.clone()),
            Param::Text(self.description.clone()),
            Param::Text(self.descriptions.clone()),
            Param::Text(self.display_name.clone()),
            Param::Text(self.display_names.clone()),
            Param::Text(self.name.clone()),
            Param::Text(self.properties.clone()),
            Param::Text(self.resources.clone()),
        ]
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        let mut scope = Self::default();
        scope.concurrency_token = text::<Self>(row, "concurrency_token")?;
        scope.description = text::<Self>(row, "description")?;
        scope.descriptions = text::<Self>(row, "descriptions")?;
        scope.display_name = text::<Self>(row, "display_name")?;
        scope.display_names = text::<Self>(row, "display_names")?;
        scope.name = text::<Self>(row, "name")?;
        scope.properties = text::<Self>(row, "properties")?;
        scope.resources = text::<Self>(row, "resources")?;
        read_id(row, &mut scope)?;
        Ok(scope)
    }

    fn push_filter(filter: &ScopeFilter<K>, builder: &mut QueryBuilder<'_, Postgres>) {
        let table = Self::TABLE;
        match filter {
            ScopeFilter::Id(id) => push_compare(builder, table, "id", "=", Param::key(Some(id))),
            ScopeFilter::Name(name) => push_compare(builder, table, "name", "=", text_param(name)),
            ScopeFilter::NameIn(names) => {
                builder.push(format!("{table}.name = ANY("));
                Param::TextArray(names.clone()).push_bind(builder);
                builder.push(")");
            }
            ScopeFilter::ResourcesContain(resource) => {
                push_contains(builder, table, "resources", resource)
            }
        }
    }
}

// =============================================================================
// Token
// =============================================================================

impl<K: EntityKey> PgEntity for Token<K> {
    const TABLE: &'static str = TOKENS_TABLE;

    const COLUMNS: &'static [&'static str] = &[
        "application_id",
        "authorization_id",
        "concurrency_token",
        "creation_date",
        "expiration_date",
        "payload",
        "properties",
        "redemption_date",
        "reference_id",
        "status",
        "subject",
        "type",
    ];

    fn values(&self) -> Vec<Param> {
        vec![
            Param::key(self.application_id.as_ref()),
            Param::key(self.authorization_id.as_ref()),
            Param::Text(self.concurrency_token.clone()),
            Param::Timestamp(self.creation_date),
            Param::Timestamp(self.expiration_date),
            Param::Text(self.payload.clone()),
            Param::Text(self.properties.clone()),
            Param::Timestamp(self.redemption_date),
            Param::Text(self.reference_id.clone()),
            Param::Text(self.status.clone()),
            Param::Text(self.subject.clone()),
            Param::Text(self.token_type.clone()),
        ]
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        let mut token = Self::default();
        token.application_id = read_key::<Self>(row, "application_id")?;
        token.authorization_id = read_key::<Self>(row, "authorization_id")?;
        token.concurrency_token = text::<Self>(row, "concurrency_token")?;
        token.creation_date = timestamp::<Self>(row, "creation_date")?;
        token.expiration_date = timestamp::<Self>(row, "expiration_date")?;
        token.payload = text::<Self>(row, "payload")?;
        token.properties = text::<Self>(row, "properties")?;
        token.redemption_date = timestamp::<Self>(row, "redemption_date")?;
        token.reference_id = text::<Self>(row, "reference_id")?;
        token.status = text::<Self>(row, "status")?;
        token.subject = text::<Self>(row, "subject")?;
        token.token_type = text::<Self>(row, "type")?;
        read_id(row, &mut token)?;
        Ok(token)
    }

    fn push_filter(filter: &TokenFilter<K>, builder: &mut QueryBuilder<'_, Postgres>) {
        let table = Self::TABLE;
        match filter {
            TokenFilter::Id(id) => push_compare(builder, table, "id", "=", Param::key(Some(id))),
            TokenFilter::ApplicationId(id) => {
                push_compare(builder, table, "application_id", "=", Param::key(Some(id)))
            }
            TokenFilter::AuthorizationId(id) => {
                push_compare(builder, table, "authorization_id", "=", Param::key(Some(id)))
            }
            TokenFilter::WithoutAuthorization => {
                builder.push(format!("{table}.authorization_id IS NULL"));
            }
            TokenFilter::Subject(subject) => {
                push_compare(builder, table, "subject", "=", text_param(subject))
            }
            TokenFilter::Status(status) => {
                push_compare(builder, table, "status", "=", text_param(status))
            }
            TokenFilter::StatusNotIn(statuses) => {
                builder.push(format!("{table}.status <> ALL("));
                Param::TextArray(statuses.clone()).push_bind(builder);
                builder.push(")");
            }
            TokenFilter::Type(kind) => push_compare(builder, table, "type", "=", text_param(kind)),
            TokenFilter::ReferenceId(reference_id) => {
                push_compare(builder, table, "reference_id", "=", text_param(reference_id))
            }
            TokenFilter::CreatedBefore(threshold) => push_compare(
                builder,
                table,
                "creation_date",
                "<",
                Param::Timestamp(Some(*threshold)),
            ),
            TokenFilter::ExpiresBefore(threshold) => push_compare(
                builder,
                table,
                "expiration_date",
                "<",
                Param::Timestamp(Some(*threshold)),
            ),
            TokenFilter::AuthorizationStatusNot(status) => {
                builder.push(format!(
                    "EXISTS (SELECT 1 FROM {AUTHORIZATIONS_TABLE} a \
                     WHERE a.id = {table}.authorization_id AND a.status <> "
                ));
                builder.push_bind(status.clone());
                builder.push(")");
            }
            TokenFilter::Any(filters) => push_any(builder, filters, Self::push_filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_sql<E: PgEntity>(filter: &E::Filter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("");
        E::push_filter(filter, &mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn test_columns_match_values() {
        assert_eq!(
            Application::<i64>::COLUMNS.len(),
            Application::<i64>::default().values().len()
        );
        assert_eq!(
            Authorization::<i64>::COLUMNS.len(),
            Authorization::<i64>::default().values().len()
        );
        assert_eq!(Scope::<i64>::COLUMNS.len(), Scope::<i64>::default().values().len());
        assert_eq!(Token::<i64>::COLUMNS.len(), Token::<i64>::default().values().len());
    }

    #[test]
    fn test_null_keys_keep_their_kind() {
        let token = Token::<uuid::Uuid>::default();
        assert_eq!(token.values()[0], Param::Key(KeyKind::Uuid, None));
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("api1"), "%api1%");
        assert_eq!(contains_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
    }

    #[test]
    fn test_simple_filters() {
        assert_eq!(
            filter_sql::<Application<i64>>(&ApplicationFilter::ClientId("portal".into())),
            "oauth_applications.client_id = $1"
        );
        assert_eq!(
            filter_sql::<Scope<i64>>(&ScopeFilter::NameIn(vec!["email".into()])),
            "oauth_scopes.name = ANY($1)"
        );
        assert_eq!(
            filter_sql::<Scope<i64>>(&ScopeFilter::ResourcesContain("api1".into())),
            "oauth_scopes.resources LIKE $1 ESCAPE '\\'"
        );
        assert_eq!(
            filter_sql::<Token<i64>>(&TokenFilter::WithoutAuthorization),
            "oauth_tokens.authorization_id IS NULL"
        );
    }

    #[test]
    fn test_any_filter() {
        let filter = TokenFilter::<i64>::Any(vec![
            TokenFilter::StatusNotIn(vec!["inactive".into(), "valid".into()]),
            TokenFilter::AuthorizationStatusNot("valid".into()),
        ]);
        let sql = filter_sql::<Token<i64>>(&filter);
        assert!(sql.starts_with("(oauth_tokens.status <> ALL($1) OR EXISTS"));
        assert!(sql.contains("a.id = oauth_tokens.authorization_id AND a.status <> $2"));
        assert!(sql.ends_with("))"));

        let empty = filter_sql::<Authorization<i64>>(&AuthorizationFilter::Any(Vec::new()));
        assert_eq!(empty, "FALSE");
    }

    #[test]
    fn test_has_tokens_filter() {
        let sql = filter_sql::<Authorization<i64>>(&AuthorizationFilter::HasTokens);
        assert_eq!(
            sql,
            "EXISTS (SELECT 1 FROM oauth_tokens t WHERE t.authorization_id = oauth_authorizations.id)"
        );
    }
}
