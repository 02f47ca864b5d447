//! MongoDB document store integration tests.
//!
//! Run with: cargo test --test storage_mongodb --features mongodb -- --ignored --nocapture
//!
//! Requires: MONGODB_URI env var or MongoDB on localhost:27017

use chrono::{TimeZone, Utc};
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Collection;

use tagvane::interfaces::{DocumentStore, StagedField};
use tagvane::model::{PublishedVersion, ReleaseDateCache};
use tagvane::storage::MongoDocumentStore;

fn mongodb_uri() -> String {
    std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

fn mongodb_database() -> String {
    std::env::var("MONGODB_DATABASE").unwrap_or_else(|_| "tagvane_test".to_string())
}

/// Collection names unique to one test, so tests can run in parallel.
fn collection_names(test: &str) -> (String, String) {
    let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    (
        format!("test_{}_projects_{}", test, suffix),
        format!("test_{}_config_{}", test, suffix),
    )
}

async fn setup(test: &str) -> (MongoDocumentStore, Collection<Document>, Collection<Document>) {
    let client = mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB");
    let db_name = mongodb_database();
    let (projects, config) = collection_names(test);

    let store = MongoDocumentStore::new(&client, &db_name, &projects, &config);
    let database = client.database(&db_name);
    (store, database.collection(&projects), database.collection(&config))
}

async fn cleanup(projects: &Collection<Document>, config: &Collection<Document>) {
    let _ = projects.drop().await;
    let _ = config.drop().await;
}

fn version(v: &str) -> PublishedVersion {
    PublishedVersion {
        version: v.to_string(),
        release_date: Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap()),
    }
}

#[tokio::test]
#[ignore = "requires running MongoDB instance"]
async fn test_mongodb_stage_and_swap() {
    println!("Connecting to: {}", mongodb_uri());
    let (store, projects, config) = setup("swap").await;

    let a = ObjectId::new();
    let b = ObjectId::new();
    projects
        .insert_many(vec![
            doc! { "_id": a, "name": "checkout-api", "owner": "payments" },
            doc! { "_id": b, "name": "billing" },
        ])
        .await
        .expect("Failed to seed projects");

    let services = store.list_services().await.expect("list_services");
    assert_eq!(services.len(), 2);
    assert!(services.iter().any(|s| s.id == a.to_hex() && s.name == "checkout-api"));

    let modified = store
        .bulk_set_field(vec![StagedField {
            id: a.to_hex(),
            field: "ecs.templive".to_string(),
            value: vec![version("1.2.4")],
        }])
        .await
        .expect("bulk_set_field");
    assert_eq!(modified, 1);

    let outcome = store
        .promote_field("ecs.templive", "ecs.live")
        .await
        .expect("promote_field");
    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.modified, 1);

    let doc_a = projects.find_one(doc! { "_id": a }).await.unwrap().unwrap();
    let ecs = doc_a.get_document("ecs").unwrap();
    assert!(ecs.get("templive").is_none());
    let live = ecs.get_array("live").unwrap();
    assert_eq!(
        live[0].as_document().unwrap().get_str("version").unwrap(),
        "1.2.4"
    );
    assert_eq!(doc_a.get_str("owner").unwrap(), "payments");

    let doc_b = projects.find_one(doc! { "_id": b }).await.unwrap().unwrap();
    assert!(doc_b.get("ecs").is_none());

    cleanup(&projects, &config).await;
}

#[tokio::test]
#[ignore = "requires running MongoDB instance"]
async fn test_mongodb_release_cache() {
    let (store, projects, config) = setup("cache").await;

    let empty = store
        .load_release_cache("singleton")
        .await
        .expect("load missing cache");
    assert!(empty.is_empty());

    let mut cache = ReleaseDateCache::new();
    let svc = cache.entry("checkout-api".to_string()).or_default();
    svc.insert("1.2.4".to_string(), version("1.2.4").release_date);
    svc.insert("1.2.3".to_string(), None);

    store
        .save_release_cache("singleton", &cache)
        .await
        .expect("save cache");
    let loaded = store
        .load_release_cache("singleton")
        .await
        .expect("load cache");
    assert_eq!(loaded, cache);

    // Saving replaces the whole cache
    let replacement = ReleaseDateCache::new();
    store
        .save_release_cache("singleton", &replacement)
        .await
        .expect("replace cache");
    assert!(store.load_release_cache("singleton").await.unwrap().is_empty());

    cleanup(&projects, &config).await;
}
