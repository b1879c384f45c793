//! Shared fixtures for the store tests.

#![allow(dead_code)]

use authstore_core::types::{authorization_types, statuses};
use authstore_core::{Application, Authorization, Scope, Stores, Token};
use authstore_memory::{MemoryDatabase, MemorySessionFactory};
use time::{Duration, OffsetDateTime};

pub type MemoryStores = Stores<MemorySessionFactory<i64>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("authstore_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn setup() -> (MemoryDatabase<i64>, MemoryStores) {
    init_tracing();
    let database = MemoryDatabase::new();
    let stores = authstore_memory::stores(&database);
    (database, stores)
}

pub fn days_ago(days: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::days(days)
}

pub async fn create_application(stores: &MemoryStores, client_id: &str) -> Application<i64> {
    let mut application = stores.applications().instantiate().unwrap();
    application.client_id = Some(client_id.to_string());
    application.display_name = Some(format!("{client_id} app"));
    stores.applications().create(&mut application).await.unwrap();
    application
}

pub async fn create_authorization(
    stores: &MemoryStores,
    application: &Application<i64>,
    subject: &str,
) -> Authorization<i64> {
    let mut authorization = stores.authorizations().instantiate().unwrap();
    let application_id = stores.applications().get_id(application);
    stores
        .authorizations()
        .set_application_id(&mut authorization, application_id.as_deref())
        .unwrap();
    authorization.subject = Some(subject.to_string());
    authorization.status = Some(statuses::VALID.to_string());
    authorization.authorization_type = Some(authorization_types::PERMANENT.to_string());
    authorization.creation_date = Some(OffsetDateTime::now_utc());
    stores
        .authorizations()
        .create(&mut authorization)
        .await
        .unwrap();
    authorization
}

pub async fn create_token(
    stores: &MemoryStores,
    application: &Application<i64>,
    authorization: Option<&Authorization<i64>>,
    subject: &str,
) -> Token<i64> {
    let mut token = stores.tokens().instantiate().unwrap();
    let application_id = stores.applications().get_id(application);
    let authorization_id = authorization.and_then(|a| stores.authorizations().get_id(a));
    stores
        .tokens()
        .set_application_id(&mut token, application_id.as_deref())
        .unwrap();
    stores
        .tokens()
        .set_authorization_id(&mut token, authorization_id.as_deref())
        .unwrap();
    token.subject = Some(subject.to_string());
    token.status = Some(statuses::VALID.to_string());
    token.token_type = Some("access_token".to_string());
    token.creation_date = Some(OffsetDateTime::now_utc());
    token.expiration_date = Some(OffsetDateTime::now_utc() + Duration::hours(1));
    stores.tokens().create(&mut token).await.unwrap();
    token
}

pub async fn create_scope(stores: &MemoryStores, name: &str, resources: &[&str]) -> Scope<i64> {
    let mut scope = stores.scopes().instantiate().unwrap();
    scope.name = Some(name.to_string());
    let resources: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
    stores.scopes().set_resources(&mut scope, &resources).unwrap();
    stores.scopes().create(&mut scope).await.unwrap();
    scope
}
