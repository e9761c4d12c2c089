//! Run-scoped key-value caches.
//!
//! Each cache is a single mutex around a map. Lookups and inserts are
//! separate critical sections, so two workers may both miss and both
//! compute; the later insert simply overwrites the earlier one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use registerscout_crawler::FetchedDocument;
use registerscout_shared::CandidateUrl;

/// String-keyed cache, last writer wins.
#[derive(Debug)]
pub struct RunCache<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V: Clone> RunCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.lock().await.insert(key.into(), value);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V: Clone> Default for RunCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every cache one attribution run shares across workers.
#[derive(Debug, Default)]
pub struct RunCaches {
    /// Council name → homepage (`None` = not found).
    pub homepages: RunCache<Option<Url>>,
    /// Council name → councillor index page (`None` = no template answered).
    pub index_pages: RunCache<Option<Url>>,
    /// Council name → ordered crawl findings.
    pub crawls: RunCache<Arc<Vec<CandidateUrl>>>,
    /// Requested URL → extracted content and anchors.
    pub documents: RunCache<Arc<FetchedDocument>>,
}

impl RunCaches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_writer_wins() {
        let cache: RunCache<Option<Url>> = RunCache::new();
        assert!(cache.get("Sandshire").await.is_none());

        cache.insert("Sandshire", None).await;
        assert_eq!(cache.get("Sandshire").await, Some(None));

        let url = Url::parse("https://www.sandshire.gov.uk/").unwrap();
        cache.insert("Sandshire", Some(url.clone())).await;
        assert_eq!(cache.get("Sandshire").await, Some(Some(url)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_keep_one_entry_per_key() {
        let cache = Arc::new(RunCache::<u32>::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.insert(format!("council-{}", i % 4), i).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len().await, 4);
    }
}
