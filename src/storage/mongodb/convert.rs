//! BSON conversions for persisted versions and the release cache.
//!
//! Release dates are stored as BSON datetimes. Strings holding RFC 3339
//! timestamps are accepted on read as well.

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use tracing::warn;

use crate::interfaces::document_store::{Result, StoreError};
use crate::model::{PublishedVersion, ReleaseDateCache};

/// Filter value for a document id: an ObjectId when `id` is one in hex.
pub(crate) fn id_value(id: &str) -> Bson {
    ObjectId::parse_str(id)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.to_string()))
}

/// Id of a listed document as a string.
pub(crate) fn id_string(id: &Bson) -> Result<String> {
    match id {
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        Bson::String(s) => Ok(s.clone()),
        Bson::Int32(n) => Ok(n.to_string()),
        Bson::Int64(n) => Ok(n.to_string()),
        other => Err(StoreError::InvalidDocument(format!(
            "Unsupported _id type: {:?}",
            other.element_type()
        ))),
    }
}

fn date_to_bson(date: Option<DateTime<Utc>>) -> Bson {
    match date {
        Some(date) => Bson::DateTime(BsonDateTime::from_millis(date.timestamp_millis())),
        None => Bson::Null,
    }
}

fn date_from_bson(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(date) => DateTime::from_timestamp_millis(date.timestamp_millis()),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

/// `[{version, releaseDate}, ...]`
pub(crate) fn versions_to_bson(versions: &[PublishedVersion]) -> Bson {
    Bson::Array(
        versions
            .iter()
            .map(|v| {
                Bson::Document(doc! {
                    "version": v.version.clone(),
                    "releaseDate": date_to_bson(v.release_date),
                })
            })
            .collect(),
    )
}

pub(crate) fn cache_to_document(cache: &ReleaseDateCache) -> Document {
    let mut services = Document::new();
    for (service, versions) in cache {
        let mut entries = Document::new();
        for (version, date) in versions {
            entries.insert(version.clone(), date_to_bson(*date));
        }
        services.insert(service.clone(), entries);
    }
    services
}

/// Parse the stored cache. Entries of an unexpected shape are skipped.
pub(crate) fn cache_from_document(document: &Document) -> ReleaseDateCache {
    let mut cache = ReleaseDateCache::new();
    for (service, versions) in document {
        let Bson::Document(versions) = versions else {
            warn!(service = %service, "Ignoring malformed release cache entry");
            continue;
        };
        let entries = cache.entry(service.clone()).or_default();
        for (version, date) in versions {
            if !matches!(date, Bson::Null) && date_from_bson(date).is_none() {
                warn!(service = %service, version = %version, "Ignoring malformed release date");
                continue;
            }
            entries.insert(version.clone(), date_from_bson(date));
        }
    }
    cache
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_id_value() {
        let hex = "65f0c0ffee65f0c0ffee65f0";
        assert!(matches!(id_value(hex), Bson::ObjectId(_)));
        assert_eq!(id_value("config"), Bson::String("config".to_string()));
        assert_eq!(id_string(&id_value(hex)).unwrap(), hex);
        assert!(id_string(&Bson::Boolean(true)).is_err());
    }

    #[test]
    fn test_versions_to_bson() {
        let date = Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap();
        let bson = versions_to_bson(&[
            PublishedVersion {
                version: "1.2.4".to_string(),
                release_date: Some(date),
            },
            PublishedVersion {
                version: "1.2.5".to_string(),
                release_date: None,
            },
        ]);

        let Bson::Array(items) = bson else {
            panic!("expected array");
        };
        let first = items[0].as_document().unwrap();
        assert_eq!(first.get_str("version").unwrap(), "1.2.4");
        assert_eq!(
            first.get_datetime("releaseDate").unwrap().timestamp_millis(),
            date.timestamp_millis()
        );
        assert_eq!(items[1].as_document().unwrap().get("releaseDate"), Some(&Bson::Null));
    }

    #[test]
    fn test_cache_document_keeps_nulls_and_dotted_versions() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut cache = ReleaseDateCache::new();
        let svc = cache.entry("svc".to_string()).or_default();
        svc.insert("1.0.0".to_string(), Some(date));
        svc.insert("1.1.0".to_string(), None);
        cache.entry("quiet".to_string()).or_default();

        let document = cache_to_document(&cache);
        assert_eq!(cache_from_document(&document), cache);
    }

    #[test]
    fn test_cache_from_document_accepts_strings_and_skips_garbage() {
        let document = doc! {
            "svc": {
                "1.0.0": "2024-03-01T00:00:00Z",
                "2.0.0": 42,
            },
            "broken": "not a map",
        };

        let cache = cache_from_document(&document);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache["svc"]["1.0.0"],
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert!(!cache["svc"].contains_key("2.0.0"));
    }
}
