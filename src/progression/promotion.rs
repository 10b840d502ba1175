//! Star promotion state machine.
//!
//! The ladder is strictly linear: None→One→Two→Three→Four→Five, no skipping,
//! no regression. Every transition re-checks its precondition from stored
//! state and then advances through a compare-and-swap on the learner's
//! current level, so re-firing a satisfied transition is a no-op and two
//! racing completions cannot double-fire or lose a promotion.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::course::aggregate_course;
use super::error::ProgressionError;
use super::types::{Learner, ModuleType, ProgressStatus, StarLevel, SubmissionKind, Tier};
use crate::config::{EngineConfig, TierBands};
use crate::store::TrackStore;

pub fn tier_for(bands: &TierBands, score_pct: u8) -> Tier {
    if score_pct >= bands.gold_min {
        Tier::Gold
    } else if score_pct >= bands.silver_min {
        Tier::Silver
    } else {
        Tier::Bronze
    }
}

pub struct PromotionEngine {
    store: Arc<dyn TrackStore>,
    config: EngineConfig,
}

impl PromotionEngine {
    pub fn new(store: Arc<dyn TrackStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    async fn require_learner(&self, learner_id: Uuid) -> Result<Learner, ProgressionError> {
        self.store
            .learner(learner_id)
            .await?
            .ok_or_else(|| ProgressionError::NotFound(format!("learner {learner_id} not found")))
    }

    async fn try_promote(
        &self,
        learner_id: Uuid,
        from: StarLevel,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        let to = from
            .next()
            .ok_or_else(|| ProgressionError::Internal("star ladder exhausted".to_string()))?;
        if self.store.promote_learner(learner_id, from, to).await? {
            info!(%learner_id, %from, %to, "star level advanced");
            Ok(Some(to))
        } else {
            // Another writer already fired this transition.
            Ok(None)
        }
    }

    /// None→One: the tier-determining assessment passed. The same transition
    /// assigns the difficulty tier from the configured score bands; retakes
    /// after promotion never reassign it.
    pub async fn after_assessment(
        &self,
        learner_id: Uuid,
        score_pct: u8,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        if learner.star_level != StarLevel::None {
            return Ok(None);
        }
        match self.try_promote(learner_id, StarLevel::None).await? {
            Some(level) => {
                let tier = tier_for(&self.config.tier_bands, score_pct);
                self.store.assign_tier(learner_id, tier).await?;
                info!(%learner_id, %tier, score_pct, "tier assigned");
                Ok(Some(level))
            }
            None => Ok(None),
        }
    }

    /// One→Two: every Course module of the product is complete per the
    /// aggregator. The full set is re-checked on each course event, since
    /// courses can finish in any order; stored status is not trusted.
    pub async fn after_course_event(
        &self,
        learner_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        if learner.star_level != StarLevel::One {
            return Ok(None);
        }

        let modules = self.store.modules_for_product(product_id).await?;
        let courses: Vec<_> = modules
            .iter()
            .filter(|m| m.module_type == ModuleType::Course)
            .collect();
        if courses.is_empty() {
            return Ok(None);
        }

        for module in courses {
            let lessons = self.store.lessons_for_module(module.id).await?;
            let details = self
                .store
                .progress(learner_id, module.id)
                .await?
                .map(|v| v.doc.details)
                .unwrap_or_default();
            if aggregate_course(&lessons, &details).status != ProgressStatus::Completed {
                return Ok(None);
            }
        }

        self.try_promote(learner_id, StarLevel::One).await
    }

    /// Two→Three: the expert-session quota is met across the product's
    /// ExpertSession modules.
    pub async fn after_expert_session(
        &self,
        learner_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        if learner.star_level != StarLevel::Two {
            return Ok(None);
        }

        let modules = self.store.modules_for_product(product_id).await?;
        let mut attended = 0usize;
        for module in modules
            .iter()
            .filter(|m| m.module_type == ModuleType::ExpertSession)
        {
            if let Some(versioned) = self.store.progress(learner_id, module.id).await? {
                attended += versioned.doc.details.sessions_attended.len();
            }
        }

        if attended < self.config.expert_session_quota as usize {
            return Ok(None);
        }
        self.try_promote(learner_id, StarLevel::Two).await
    }

    /// Three→Four: the active project submission carries a passed verdict.
    pub async fn after_project_verdict(
        &self,
        learner_id: Uuid,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        self.after_submission_verdict(learner_id, SubmissionKind::Project, StarLevel::Three)
            .await
    }

    /// Four→Five: the active interview submission carries a passed verdict.
    pub async fn after_interview_verdict(
        &self,
        learner_id: Uuid,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        self.after_submission_verdict(learner_id, SubmissionKind::Interview, StarLevel::Four)
            .await
    }

    async fn after_submission_verdict(
        &self,
        learner_id: Uuid,
        kind: SubmissionKind,
        from: StarLevel,
    ) -> Result<Option<StarLevel>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        if learner.star_level != from {
            return Ok(None);
        }
        let submission = self.store.active_submission(learner_id, kind).await?;
        if submission.and_then(|s| s.passed) != Some(true) {
            return Ok(None);
        }
        self.try_promote(learner_id, from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn tier_bands_split_bronze_silver_gold() {
        let bands = TierBands::default();
        assert_eq!(tier_for(&bands, 0), Tier::Bronze);
        assert_eq!(tier_for(&bands, 69), Tier::Bronze);
        assert_eq!(tier_for(&bands, 70), Tier::Silver);
        assert_eq!(tier_for(&bands, 85), Tier::Silver);
        assert_eq!(tier_for(&bands, 86), Tier::Gold);
        assert_eq!(tier_for(&bands, 100), Tier::Gold);
    }

    #[tokio::test]
    async fn assessment_promotion_assigns_tier_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let engine = PromotionEngine::new(store.clone(), EngineConfig::default());
        let learner = Learner::new("Ravi", "graduate");
        let id = learner.id;
        store.upsert_learner(learner).await.unwrap();

        let promoted = engine.after_assessment(id, 90).await.unwrap();
        assert_eq!(promoted, Some(StarLevel::One));
        let stored = store.learner(id).await.unwrap().unwrap();
        assert_eq!(stored.star_level, StarLevel::One);
        assert_eq!(stored.tier, Some(Tier::Gold));

        // Retake with a lower score: no second fire, tier untouched.
        let again = engine.after_assessment(id, 10).await.unwrap();
        assert_eq!(again, None);
        let stored = store.learner(id).await.unwrap().unwrap();
        assert_eq!(stored.tier, Some(Tier::Gold));
    }

    #[tokio::test]
    async fn project_verdict_only_fires_from_three() {
        let store = Arc::new(MemoryStore::new());
        let engine = PromotionEngine::new(store.clone(), EngineConfig::default());
        let learner = Learner::new("Mina", "self-taught");
        let id = learner.id;
        store.upsert_learner(learner).await.unwrap();

        // No submission, wrong level: nothing fires.
        assert_eq!(engine.after_project_verdict(id).await.unwrap(), None);
    }
}
