mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use authstore_core::{ApplicationFilter, ApplicationStore, StoreError};
use common::{create_application, create_authorization, create_token, setup};

#[tokio::test]
async fn test_create_assigns_id_and_concurrency_token() {
    let (_database, stores) = setup();

    let application = create_application(&stores, "portal").await;

    let id = stores.applications().get_id(&application).unwrap();
    assert!(application.concurrency_token.is_some());

    let found = stores.applications().find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(found.client_id.as_deref(), Some("portal"));
    assert_eq!(found.concurrency_token, application.concurrency_token);
}

#[tokio::test]
async fn test_find_by_client_id() {
    let (_database, stores) = setup();
    create_application(&stores, "portal").await;
    create_application(&stores, "mobile").await;

    let found = stores.applications().find_by_client_id("mobile").await.unwrap();
    assert_eq!(found.unwrap().client_id.as_deref(), Some("mobile"));

    let missing = stores.applications().find_by_client_id("desktop").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_duplicate_client_id_is_rejected() {
    let (_database, stores) = setup();
    create_application(&stores, "portal").await;

    let mut duplicate = stores.applications().instantiate().unwrap();
    duplicate.client_id = Some("portal".into());
    let err = stores.applications().create(&mut duplicate).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_arguments_are_validated_before_io() {
    let (database, stores) = setup();
    database.inject_fault(|_, _, _| true);

    let err = stores.applications().find_by_client_id("").await.unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(stores.applications().find_by_redirect_uri("").unwrap_err().is_invalid_argument());
    assert!(stores.applications().find_by_id("").await.unwrap_err().is_invalid_argument());
    assert!(stores.applications().find_by_id("abc").await.unwrap_err().is_invalid_argument());

    let never_persisted = stores.applications().instantiate().unwrap();
    let err = stores.applications().delete(&never_persisted).await.unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test]
async fn test_stale_update_is_concurrency_error() {
    let (_database, stores) = setup();
    let application = create_application(&stores, "portal").await;
    let id = stores.applications().get_id(&application).unwrap();

    let mut first = stores.applications().find_by_id(&id).await.unwrap().unwrap();
    let mut second = stores.applications().find_by_id(&id).await.unwrap().unwrap();

    first.display_name = Some("first".into());
    stores.applications().update(&mut first).await.unwrap();
    assert_ne!(first.concurrency_token, application.concurrency_token);

    let stale_token = second.concurrency_token.clone();
    second.display_name = Some("second".into());
    let err = stores.applications().update(&mut second).await.unwrap_err();
    assert!(err.is_concurrency());
    assert!(matches!(err, StoreError::Concurrency { ref source, .. } if source.is_conflict()));
    assert_eq!(second.concurrency_token, stale_token);

    let stored = stores.applications().find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("first"));
}

#[tokio::test]
async fn test_update_of_deleted_application_is_concurrency_error() {
    let (_database, stores) = setup();
    let mut application = create_application(&stores, "portal").await;
    stores.applications().delete(&application).await.unwrap();

    application.display_name = Some("renamed".into());
    let err = stores.applications().update(&mut application).await.unwrap_err();
    assert!(err.is_concurrency());
}

#[tokio::test]
async fn test_delete_cascades_to_authorizations_and_tokens() {
    let (database, stores) = setup();
    let application = create_application(&stores, "portal").await;
    let other = create_application(&stores, "mobile").await;

    for subject in ["alice", "bob"] {
        let authorization = create_authorization(&stores, &application, subject).await;
        create_token(&stores, &application, Some(&authorization), subject).await;
        create_token(&stores, &application, Some(&authorization), subject).await;
    }
    create_token(&stores, &application, None, "alice").await;
    create_token(&stores, &application, None, "carol").await;
    let kept = create_authorization(&stores, &other, "alice").await;
    create_token(&stores, &other, Some(&kept), "alice").await;

    stores.applications().delete(&application).await.unwrap();

    let counts = database
        .inspect(|t| (t.application_count(), t.authorization_count(), t.token_count()))
        .await;
    assert_eq!(counts, (1, 1, 1));

    let id = stores.applications().get_id(&application).unwrap();
    assert!(stores.applications().find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_cascade_rolls_back() {
    let (database, stores) = setup();
    let application = create_application(&stores, "portal").await;
    let authorization = create_authorization(&stores, &application, "alice").await;
    create_token(&stores, &application, Some(&authorization), "alice").await;
    create_token(&stores, &application, None, "alice").await;

    let mut renamed = application.clone();
    renamed.display_name = Some("renamed".into());
    stores.applications().update(&mut renamed).await.unwrap();

    let err = stores.applications().delete(&application).await.unwrap_err();
    assert!(err.is_concurrency());

    let counts = database
        .inspect(|t| (t.application_count(), t.authorization_count(), t.token_count()))
        .await;
    assert_eq!(counts, (1, 1, 2));
}

#[tokio::test]
async fn test_dropped_cascade_delete_rolls_back() {
    let (database, stores) = setup();
    let application = create_application(&stores, "portal").await;
    let authorization = create_authorization(&stores, &application, "alice").await;
    create_token(&stores, &application, Some(&authorization), "alice").await;
    create_token(&stores, &application, None, "alice").await;

    database.inject_latency(Duration::from_millis(200));
    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        stores.applications().delete(&application),
    )
    .await;
    assert!(timed_out.is_err());
    database.clear_latency();

    let other_scope = authstore_memory::stores(&database);
    let count = tokio::time::timeout(Duration::from_secs(1), other_scope.tokens().count())
        .await
        .expect("the abandoned transaction still holds the tables");
    assert_eq!(count.unwrap(), 2);

    let counts = database
        .inspect(|t| (t.application_count(), t.authorization_count(), t.token_count()))
        .await;
    assert_eq!(counts, (1, 1, 2));

    stores.applications().delete(&application).await.unwrap();
    let counts = database
        .inspect(|t| (t.application_count(), t.authorization_count(), t.token_count()))
        .await;
    assert_eq!(counts, (0, 0, 0));
}

#[tokio::test]
async fn test_find_by_redirect_uri_requires_exact_member() {
    let (_database, stores) = setup();
    let mut application = stores.applications().instantiate().unwrap();
    application.client_id = Some("portal".into());
    stores
        .applications()
        .set_redirect_uris(
            &mut application,
            &["https://app.example.com/callback".to_string()],
        )
        .unwrap();
    stores
        .applications()
        .set_post_logout_redirect_uris(&mut application, &["https://app.example.com/".to_string()])
        .unwrap();
    stores.applications().create(&mut application).await.unwrap();

    let exact = stores
        .applications()
        .find_by_redirect_uri("https://app.example.com/callback")
        .unwrap()
        .to_vec()
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);

    let prefix = stores
        .applications()
        .find_by_redirect_uri("https://app.example.com/call")
        .unwrap()
        .to_vec()
        .await
        .unwrap();
    assert!(prefix.is_empty());

    let logout = stores
        .applications()
        .find_by_post_logout_redirect_uri("https://app.example.com/")
        .unwrap()
        .to_vec()
        .await
        .unwrap();
    assert_eq!(logout.len(), 1);
}

#[tokio::test]
async fn test_projection_accessors() {
    let (_database, stores) = setup();
    let applications = stores.applications();
    let mut application = applications.instantiate().unwrap();

    applications.set_permissions(&mut application, &[]).unwrap();
    assert!(application.permissions.is_none());
    assert!(applications.get_permissions(&application).unwrap().is_empty());

    let permissions = vec!["ept:token".to_string(), "gt:client_credentials".to_string()];
    applications.set_permissions(&mut application, &permissions).unwrap();
    assert_eq!(*applications.get_permissions(&application).unwrap(), permissions);

    let mut names = BTreeMap::new();
    names.insert("fr-FR".to_string(), "Portail".to_string());
    applications.set_display_names(&mut application, &names).unwrap();
    let read = applications.get_display_names(&application).unwrap();
    assert_eq!(read.get("fr-FR").map(String::as_str), Some("Portail"));

    let mut settings = BTreeMap::new();
    settings.insert("tkn_lft:act".to_string(), "00:30:00".to_string());
    applications.set_settings(&mut application, &settings).unwrap();
    assert_eq!(applications.get_settings(&application).unwrap().len(), 1);

    let mut properties = BTreeMap::new();
    properties.insert("tenant".to_string(), serde_json::json!({ "id": 7 }));
    applications.set_properties(&mut application, &properties).unwrap();
    let read = applications.get_properties(&application).unwrap();
    assert_eq!(read["tenant"]["id"], 7);

    applications.set_properties(&mut application, &BTreeMap::new()).unwrap();
    assert!(application.properties.is_none());
}

#[tokio::test]
async fn test_get_and_list_with_caller_query() {
    let (_database, stores) = setup();
    create_application(&stores, "portal").await;
    create_application(&stores, "mobile").await;

    let found = stores
        .applications()
        .get(
            |query, client_id: &String| query.filter(ApplicationFilter::ClientId(client_id.clone())),
            &"mobile".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(found.unwrap().client_id.as_deref(), Some("mobile"));

    let listed = stores
        .applications()
        .list_with(|query, limit: &u64| query.limit(*limit), 1)
        .to_vec()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].client_id.as_deref(), Some("portal"));
}

#[tokio::test]
async fn test_instantiation_hook_failure() {
    let (_database, stores) = setup();
    let store = ApplicationStore::new(stores.context().clone())
        .with_instantiator(|| Err("no default constructor".into()));

    let err = store.instantiate().unwrap_err();
    assert!(err.is_instantiation());
    assert!(err.to_string().contains("Application"));
}
