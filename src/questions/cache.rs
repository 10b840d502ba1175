//! Explicit TTL cache for generated question sets.
//!
//! Injected as a dependency of [`super::QuestionService`] rather than living
//! in a module-level map, so tests can construct and expire it at will.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::trace;

use crate::progression::types::QuizQuestion;

#[derive(Debug, Clone)]
pub struct QuestionCacheConfig {
    pub ttl: Duration,
}

impl Default for QuestionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(900),
        }
    }
}

struct CacheEntry {
    expires_at: Instant,
    questions: Vec<QuizQuestion>,
}

pub struct QuestionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl QuestionCache {
    pub fn new(config: QuestionCacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<QuizQuestion>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    trace!(key, "question cache hit");
                    return Some(entry.questions.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop the entry on the way out.
        self.entries.write().await.remove(key);
        None
    }

    pub async fn put(&self, key: String, questions: Vec<QuizQuestion>) {
        let entry = CacheEntry {
            expires_at: Instant::now() + self.ttl,
            questions,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
