//! MongoDB implementation of the document store.

mod convert;
mod document_store;

pub use document_store::MongoDocumentStore;

/// Field of the config singleton holding the release cache.
pub(crate) const RELEASE_CACHE_FIELD: &str = "gitReleases";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_cache_field() {
        assert_eq!(RELEASE_CACHE_FIELD, "gitReleases");
    }
}
