//! MongoDB DocumentStore implementation.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneOptions, FindOptions, UpdateOptions};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info, warn};

use crate::config::MongodbConfig;
use crate::interfaces::document_store::{
    DocumentStore, Result, StagedField, StoreError, SwapOutcome,
};
use crate::model::{ReleaseDateCache, ServiceRecord};

use super::convert::{cache_from_document, cache_to_document, id_string, id_value, versions_to_bson};
use super::RELEASE_CACHE_FIELD;

/// MongoDB implementation of DocumentStore.
///
/// Service documents live in the projects collection; the release cache is
/// a field of a singleton document in the config collection, addressed by
/// its string `_id`.
pub struct MongoDocumentStore {
    database: Database,
    projects: Collection<Document>,
    config: Collection<Document>,
}

impl MongoDocumentStore {
    /// Connect using the assembled URI from `config`.
    pub async fn connect(config: &MongodbConfig) -> Result<Self> {
        info!(uri = %config.redacted_uri(), database = %config.database, "Connecting to MongoDB");
        let client = Client::with_uri_str(config.uri()).await?;
        Ok(Self::new(
            &client,
            &config.database,
            &config.projects_collection,
            &config.config_collection,
        ))
    }

    pub fn new(client: &Client, database_name: &str, projects: &str, config: &str) -> Self {
        let database = client.database(database_name);
        Self {
            projects: database.collection(projects),
            config: database.collection(config),
            database,
        }
    }
}

/// Count from a command reply, which may be encoded as either integer width.
fn reply_count(reply: &Document, key: &str) -> u64 {
    reply
        .get_i32(key)
        .map(|n| n as u64)
        .or_else(|_| reply.get_i64(key).map(|n| n as u64))
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        let options = FindOptions::builder()
            .projection(doc! { "_id": 1, "name": 1 })
            .build();

        let mut cursor = self.projects.find(doc! {}).with_options(options).await?;

        let mut services = Vec::new();
        while cursor.advance().await? {
            let document = cursor.deserialize_current()?;
            let id = match document.get("_id") {
                Some(id) => id_string(id)?,
                None => return Err(StoreError::InvalidDocument("Missing _id".to_string())),
            };
            match document.get_str("name") {
                Ok(name) => services.push(ServiceRecord::new(id, name)),
                Err(_) => warn!(id = %id, "Skipping service document without a name"),
            }
        }

        Ok(services)
    }

    async fn bulk_set_field(&self, updates: Vec<StagedField>) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let statements: Vec<Document> = updates
            .iter()
            .map(|update| {
                let mut set = Document::new();
                set.insert(update.field.clone(), versions_to_bson(&update.value));
                doc! {
                    "q": { "_id": id_value(&update.id) },
                    "u": { "$set": set },
                }
            })
            .collect();

        let command = doc! {
            "update": self.projects.name(),
            "updates": statements,
            "ordered": false,
        };
        let reply = self.database.run_command(command).await?;

        if let Ok(errors) = reply.get_array("writeErrors") {
            if !errors.is_empty() {
                return Err(StoreError::Backend(format!(
                    "Bulk write failed for {} of {} documents: {:?}",
                    errors.len(),
                    updates.len(),
                    errors.first()
                )));
            }
        }

        let modified = reply_count(&reply, "nModified");
        debug!(
            matched = reply_count(&reply, "n"),
            modified,
            "Bulk write complete"
        );
        Ok(modified)
    }

    async fn promote_field(&self, staging_field: &str, target_field: &str) -> Result<SwapOutcome> {
        let filter = doc! { staging_field: { "$exists": true } };

        let mut set = Document::new();
        set.insert(target_field, format!("${}", staging_field));
        let pipeline = vec![
            doc! { "$set": set },
            doc! { "$unset": [staging_field] },
        ];

        let result = self.projects.update_many(filter, pipeline).await?;

        Ok(SwapOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn load_release_cache(&self, key: &str) -> Result<ReleaseDateCache> {
        let options = FindOneOptions::builder()
            .projection(doc! { RELEASE_CACHE_FIELD: 1, "_id": 0 })
            .build();

        let document = self
            .config
            .find_one(doc! { "_id": key })
            .with_options(options)
            .await?;

        let cache = match document.as_ref().map(|d| d.get(RELEASE_CACHE_FIELD)) {
            Some(Some(Bson::Document(cache))) => cache_from_document(cache),
            Some(Some(other)) => {
                return Err(StoreError::InvalidDocument(format!(
                    "{} is a {:?}, expected a document",
                    RELEASE_CACHE_FIELD,
                    other.element_type()
                )))
            }
            _ => ReleaseDateCache::new(),
        };

        Ok(cache)
    }

    async fn save_release_cache(&self, key: &str, cache: &ReleaseDateCache) -> Result<()> {
        let update = doc! { "$set": { RELEASE_CACHE_FIELD: cache_to_document(cache) } };
        let options = UpdateOptions::builder().upsert(true).build();

        self.config
            .update_one(doc! { "_id": key }, update)
            .with_options(options)
            .await?;

        Ok(())
    }
}
