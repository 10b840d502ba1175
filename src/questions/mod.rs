//! Quiz question supply.
//!
//! Questions come from an external AI generator behind the [`QuestionSource`]
//! trait. Generation is deterministic for a `(target, tier, seed)` triple so
//! grading can regenerate the same quiz without persisting the answer key.
//! Failures retry a bounded number of times, then fall back to a pre-authored
//! bank; only when both are empty-handed does the error surface. A failed
//! generator never turns into an implicit pass.

pub mod cache;
pub mod http;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::progression::types::{QuizQuestion, QuizSpec, Tier};

pub use cache::{QuestionCache, QuestionCacheConfig};
pub use http::HttpQuestionSource;

#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("question source unavailable: {0}")]
    Unavailable(String),
    #[error("question source returned invalid payload: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Produce the question set (with answer keys) for one quiz. Must be
    /// deterministic for a fixed `seed`: same inputs, same questions, same
    /// option ids.
    async fn generate(
        &self,
        spec: &QuizSpec,
        tier: Tier,
        seed: u64,
    ) -> Result<Vec<QuizQuestion>, QuestionError>;
}

/// Stable per-(learner, target) seed, so serving and grading regenerate the
/// identical quiz.
pub fn quiz_seed(learner_id: Uuid, target_id: Uuid) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(learner_id.as_bytes());
    hasher.update(target_id.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().unwrap_or_default())
}

/// Pre-authored questions served when the generator is down.
#[derive(Default)]
pub struct FallbackBank {
    by_target: HashMap<Uuid, Vec<QuizQuestion>>,
}

impl FallbackBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target_id: Uuid, questions: Vec<QuizQuestion>) {
        self.by_target.insert(target_id, questions);
    }

    pub fn questions_for(&self, target_id: Uuid) -> Option<Vec<QuizQuestion>> {
        self.by_target.get(&target_id).cloned()
    }
}

/// Front door for question supply: cache, then generator with retries, then
/// the fallback bank.
pub struct QuestionService {
    source: Arc<dyn QuestionSource>,
    bank: FallbackBank,
    cache: QuestionCache,
    retry_limit: u32,
}

impl QuestionService {
    pub fn new(
        source: Arc<dyn QuestionSource>,
        bank: FallbackBank,
        cache: QuestionCache,
        retry_limit: u32,
    ) -> Self {
        Self {
            source,
            bank,
            cache,
            retry_limit,
        }
    }

    pub async fn questions_for(
        &self,
        target_id: Uuid,
        spec: &QuizSpec,
        tier: Tier,
        seed: u64,
    ) -> Result<Vec<QuizQuestion>, QuestionError> {
        let key = cache_key(target_id, tier, seed);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let mut last_error = None;
        for attempt in 0..=self.retry_limit {
            match self.source.generate(spec, tier, seed).await {
                Ok(questions) if !questions.is_empty() => {
                    self.cache.put(key, questions.clone()).await;
                    return Ok(questions);
                }
                Ok(_) => {
                    last_error = Some(QuestionError::Invalid("empty question set".to_string()));
                }
                Err(err) => {
                    warn!(%target_id, attempt, error = %err, "question generation failed");
                    last_error = Some(err);
                }
            }
        }

        if let Some(questions) = self.bank.questions_for(target_id) {
            info!(%target_id, "serving pre-authored fallback questions");
            self.cache.put(key, questions.clone()).await;
            return Ok(questions);
        }

        Err(last_error
            .unwrap_or_else(|| QuestionError::Unavailable("no question source".to_string())))
    }
}

fn cache_key(target_id: Uuid, tier: Tier, seed: u64) -> String {
    format!("quiz:{target_id}:{tier}:{seed:016x}")
}
