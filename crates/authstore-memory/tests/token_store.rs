mod common;

use std::collections::BTreeMap;

use authstore_core::types::statuses;
use authstore_core::{StoreError, TokenFilter, TokenStore};
use authstore_memory::Operation;
use common::{create_application, create_authorization, create_token, days_ago, setup};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn test_find_by_reference_id() {
    let (_database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    let mut token = create_token(&stores, &portal, None, "alice").await;
    token.reference_id = Some("ref-123".into());
    stores.tokens().update(&mut token).await.unwrap();

    let found = stores.tokens().find_by_reference_id("ref-123").await.unwrap();
    assert_eq!(found.unwrap().id(), token.id());
    assert!(stores.tokens().find_by_reference_id("ref-999").await.unwrap().is_none());
    assert!(stores.tokens().find_by_reference_id("").await.unwrap_err().is_invalid_argument());
}

#[tokio::test]
async fn test_duplicate_reference_id_is_rejected() {
    let (_database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    let mut first = create_token(&stores, &portal, None, "alice").await;
    first.reference_id = Some("ref-123".into());
    stores.tokens().update(&mut first).await.unwrap();

    let mut second = stores.tokens().instantiate().unwrap();
    second.reference_id = Some("ref-123".into());
    let err = stores.tokens().create(&mut second).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_find_by_criteria() {
    let (_database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    let mobile = create_application(&stores, "mobile").await;
    let authorization = create_authorization(&stores, &portal, "alice").await;
    create_token(&stores, &portal, Some(&authorization), "alice").await;
    create_token(&stores, &portal, None, "alice").await;
    create_token(&stores, &mobile, None, "alice").await;
    create_token(&stores, &mobile, None, "bob").await;

    let tokens = stores.tokens();
    assert_eq!(tokens.find_by_subject("alice").unwrap().to_vec().await.unwrap().len(), 3);

    let portal_id = stores.applications().get_id(&portal).unwrap();
    let by_app = tokens.find_by_application_id(&portal_id).unwrap();
    assert_eq!(by_app.to_vec().await.unwrap().len(), 2);

    let authorization_id = stores.authorizations().get_id(&authorization).unwrap();
    let by_authorization = tokens.find_by_authorization_id(&authorization_id).unwrap();
    assert_eq!(by_authorization.to_vec().await.unwrap().len(), 1);

    let mobile_id = stores.applications().get_id(&mobile).unwrap();
    let found = tokens
        .find(Some("bob"), Some(mobile_id.as_str()), Some(statuses::VALID), Some("access_token"))
        .unwrap()
        .to_vec()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let count = tokens
        .count_where(authstore_core::Query::new().filter(TokenFilter::WithoutAuthorization))
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_foreign_key_codec() {
    let (_database, stores) = setup();
    let tokens = stores.tokens();
    let mut token = tokens.instantiate().unwrap();

    tokens.set_application_id(&mut token, Some("42")).unwrap();
    assert_eq!(token.application_id, Some(42));
    assert_eq!(tokens.get_application_id(&token).as_deref(), Some("42"));

    tokens.set_authorization_id(&mut token, None).unwrap();
    assert!(tokens.get_authorization_id(&token).is_none());

    let err = tokens.set_authorization_id(&mut token, Some("x1")).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test]
async fn test_properties_projection() {
    let (_database, stores) = setup();
    let tokens = stores.tokens();
    let mut token = tokens.instantiate().unwrap();
    assert!(tokens.get_properties(&token).unwrap().is_empty());

    let mut properties = BTreeMap::new();
    properties.insert("dpop_jkt".to_string(), serde_json::json!("0ZcOCORZNYy"));
    tokens.set_properties(&mut token, &properties).unwrap();
    assert_eq!(token.properties.as_deref(), Some(r#"{"dpop_jkt":"0ZcOCORZNYy"}"#));
    assert_eq!(*tokens.get_properties(&token).unwrap(), properties);
}

#[tokio::test]
async fn test_revoke_by_subject() {
    let (_database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    for _ in 0..3 {
        create_token(&stores, &portal, None, "alice").await;
    }
    create_token(&stores, &portal, None, "bob").await;

    let revoked = stores.tokens().revoke_by_subject("alice").await.unwrap();
    assert_eq!(revoked, 3);

    let alice = stores.tokens().find_by_subject("alice").unwrap().to_vec().await.unwrap();
    assert!(alice.iter().all(|t| t.status.as_deref() == Some(statuses::REVOKED)));

    let bob = stores.tokens().find_by_subject("bob").unwrap().to_vec().await.unwrap();
    assert_eq!(bob[0].status.as_deref(), Some(statuses::VALID));
}

#[tokio::test]
async fn test_revoke_with_no_matches() {
    let (_database, stores) = setup();
    assert_eq!(stores.tokens().revoke_by_subject("nobody").await.unwrap(), 0);
    assert_eq!(
        stores.tokens().revoke(None, None, Some(statuses::VALID), None).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_revoke_by_authorization_id_collects_failures() {
    let (database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    let authorization = create_authorization(&stores, &portal, "alice").await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let token = create_token(&stores, &portal, Some(&authorization), "alice").await;
        ids.push(stores.tokens().get_id(&token).unwrap());
    }

    let failing = ids[2].clone();
    database.inject_fault(move |operation, entity, id| {
        operation == Operation::Update && entity == "Token" && id == failing
    });

    let authorization_id = stores.authorizations().get_id(&authorization).unwrap();
    let err = stores
        .tokens()
        .revoke_by_authorization_id(&authorization_id)
        .await
        .unwrap_err();
    let StoreError::Aggregate { succeeded, errors } = err else {
        panic!("expected aggregate error");
    };
    assert_eq!(succeeded, 2);
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn test_prune_removes_expired_valid_token() {
    let (database, stores) = setup();
    let portal = create_application(&stores, "portal").await;

    let mut expired = create_token(&stores, &portal, None, "alice").await;
    expired.creation_date = Some(days_ago(2));
    expired.expiration_date = Some(OffsetDateTime::now_utc() - Duration::hours(1));
    stores.tokens().update(&mut expired).await.unwrap();

    let mut live = create_token(&stores, &portal, None, "alice").await;
    live.creation_date = Some(days_ago(2));
    stores.tokens().update(&mut live).await.unwrap();

    let pruned = stores.tokens().prune(days_ago(1)).await.unwrap();
    assert_eq!(pruned, 1);

    let expired_id = stores.tokens().get_id(&expired).unwrap();
    assert!(stores.tokens().find_by_id(&expired_id).await.unwrap().is_none());
    assert_eq!(database.inspect(|t| t.token_count()).await, 1);
}

#[tokio::test]
async fn test_prune_selects_stale_statuses_and_authorizations() {
    let (database, stores) = setup();
    let portal = create_application(&stores, "portal").await;
    let mut revoked_authorization = create_authorization(&stores, &portal, "alice").await;
    revoked_authorization.status = Some(statuses::REVOKED.to_string());
    stores
        .authorizations()
        .update(&mut revoked_authorization)
        .await
        .unwrap();
    let valid_authorization = create_authorization(&stores, &portal, "bob").await;

    let cases = [
        (statuses::REDEEMED, None, true),
        (statuses::INACTIVE, None, false),
        (statuses::VALID, Some(&revoked_authorization), true),
        (statuses::VALID, Some(&valid_authorization), false),
    ];
    for (status, authorization, _) in &cases {
        let mut token = create_token(&stores, &portal, *authorization, "alice").await;
        token.status = Some(status.to_string());
        token.creation_date = Some(days_ago(10));
        stores.tokens().update(&mut token).await.unwrap();
    }
    let mut recent = create_token(&stores, &portal, None, "alice").await;
    recent.status = Some(statuses::REVOKED.to_string());
    stores.tokens().update(&mut recent).await.unwrap();

    let expected = cases.iter().filter(|(_, _, stale)| *stale).count() as u64;
    let pruned = stores.tokens().prune(days_ago(5)).await.unwrap();
    assert_eq!(pruned, expected);
    assert_eq!(database.inspect(|t| t.token_count()).await, 3);
}

#[tokio::test]
async fn test_instantiation_hook_failure() {
    let (_database, stores) = setup();
    let tokens = TokenStore::new(stores.context().clone())
        .with_instantiator(|| Err("token type is abstract".into()));

    let err = tokens.instantiate().unwrap_err();
    assert!(err.is_instantiation());
    assert!(std::error::Error::source(&err).is_some());
}
