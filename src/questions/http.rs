//! HTTP-backed question source for the external AI generator.
//!
//! The generator contract: `POST {base}/v1/questions` with topic, count,
//! tier and seed; it answers with prompts and flagged options. Ids are
//! derived here as v5 UUIDs from the seed and the content, so regenerating
//! with the same seed yields byte-identical questions and keys.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use super::{QuestionError, QuestionSource};
use crate::progression::types::{QuestionKind, QuizOption, QuizQuestion, QuizSpec, Tier};

pub struct HttpQuestionSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    topic: &'a str,
    count: u32,
    tier: Tier,
    seed: u64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    questions: Vec<GeneratedQuestion>,
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    prompt: String,
    kind: QuestionKind,
    options: Vec<GeneratedOption>,
}

#[derive(Deserialize)]
struct GeneratedOption {
    text: String,
    #[serde(default)]
    correct: bool,
}

impl HttpQuestionSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QuestionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuestionError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl QuestionSource for HttpQuestionSource {
    async fn generate(
        &self,
        spec: &QuizSpec,
        tier: Tier,
        seed: u64,
    ) -> Result<Vec<QuizQuestion>, QuestionError> {
        let response = self
            .client
            .post(format!("{}/v1/questions", self.base_url))
            .json(&GenerateRequest {
                topic: &spec.topic,
                count: spec.question_count,
                tier,
                seed,
            })
            .send()
            .await
            .map_err(|e| QuestionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QuestionError::Unavailable(format!(
                "generator returned {}",
                response.status()
            )));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| QuestionError::Invalid(e.to_string()))?;

        let namespace = seed_namespace(seed);
        payload
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, q)| convert(&namespace, index, q))
            .collect()
    }
}

fn seed_namespace(seed: u64) -> Uuid {
    Uuid::from_u64_pair(seed, 0x7175_697a_6e73_7063)
}

fn convert(
    namespace: &Uuid,
    index: usize,
    generated: GeneratedQuestion,
) -> Result<QuizQuestion, QuestionError> {
    let question_id = Uuid::new_v5(
        namespace,
        format!("q{index}:{}", generated.prompt).as_bytes(),
    );

    let mut options = Vec::with_capacity(generated.options.len());
    let mut correct = BTreeSet::new();
    for option in &generated.options {
        let id = Uuid::new_v5(&question_id, option.text.as_bytes());
        if option.correct {
            correct.insert(id);
        }
        options.push(QuizOption {
            id,
            text: option.text.clone(),
        });
    }

    match generated.kind {
        QuestionKind::Mcq | QuestionKind::TrueFalse if correct.len() != 1 => {
            return Err(QuestionError::Invalid(format!(
                "single-choice question {index} has {} correct options",
                correct.len()
            )));
        }
        QuestionKind::Msq if correct.is_empty() => {
            return Err(QuestionError::Invalid(format!(
                "multi-select question {index} has no correct options"
            )));
        }
        _ => {}
    }

    Ok(QuizQuestion {
        id: question_id,
        prompt: generated.prompt,
        kind: generated.kind,
        options,
        correct,
    })
}
