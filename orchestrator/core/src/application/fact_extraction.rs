// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fact extraction
//!
//! Mines free text for one durable fact about the user (a constraint, a
//! preference or a goal) and stores it through the memory service. New
//! memories are queued for indexing so they become retrievable later.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lifeos_cortex::application::{MemoryError, MemoryService};
use lifeos_cortex::domain::MemoryCategory;

use crate::domain::jobs::{Job, JobQueue};
use crate::domain::llm::{GenerationOptions, LLMError};
use crate::domain::profile::UserId;
use crate::infrastructure::json_recovery::recover_object;
use crate::infrastructure::llm::registry::ProviderRegistry;
use crate::infrastructure::prompt_template_engine::{PromptTemplateEngine, FACT_TEMPLATE};

const EXTRACTION_MAX_TOKENS: u32 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No generation backend configured for alias '{0}'")]
    NotConfigured(String),

    #[error("Extraction backend failed: {0}")]
    Backend(#[from] LLMError),

    #[error("Extractor output was not usable: {0}")]
    Malformed(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// What an extraction run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    NothingFound,
    Created { text: String, category: MemoryCategory },
    Reinforced { text: String, category: MemoryCategory },
}

#[derive(Serialize)]
struct FactPrompt<'a> {
    message: &'a str,
}

pub struct FactExtractor {
    registry: Arc<ProviderRegistry>,
    templates: Arc<PromptTemplateEngine>,
    memory: Arc<dyn MemoryService>,
    jobs: Arc<dyn JobQueue>,
    model_alias: String,
}

impl FactExtractor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        templates: Arc<PromptTemplateEngine>,
        memory: Arc<dyn MemoryService>,
        jobs: Arc<dyn JobQueue>,
        model_alias: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            templates,
            memory,
            jobs,
            model_alias: model_alias.into(),
        }
    }

    pub async fn extract(&self, user_id: UserId, text: &str) -> Result<ExtractionOutcome, ExtractionError> {
        let resolved = self
            .registry
            .resolve(&self.model_alias)
            .ok_or_else(|| ExtractionError::NotConfigured(self.model_alias.clone()))?;

        let prompt = self
            .templates
            .render(FACT_TEMPLATE, &FactPrompt { message: text })
            .map_err(|e| ExtractionError::Malformed(format!("{:#}", e)))?;
        let options = GenerationOptions {
            max_tokens: Some(EXTRACTION_MAX_TOKENS),
            temperature: Some(0.0),
            stop_sequences: None,
            json_mode: true,
        };

        let response = resolved.provider.generate(&prompt, &options).await?;
        let raw = recover_object(&response.text).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let found = match raw.get("found") {
            Some(Value::Bool(found)) => *found,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        let fact = raw
            .get("fact")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if !found || fact.is_empty() {
            debug!(user_id = %user_id, "No durable fact in message");
            return Ok(ExtractionOutcome::NothingFound);
        }

        let category = raw
            .get("category")
            .and_then(Value::as_str)
            .and_then(MemoryCategory::parse)
            .unwrap_or(MemoryCategory::Preference);

        let outcome = self.memory.add_memory(user_id, fact, category).await?;
        let text = outcome.memory().text.clone();

        if !outcome.is_new() {
            info!(user_id = %user_id, %category, "Extracted fact reinforced an existing memory");
            return Ok(ExtractionOutcome::Reinforced { text, category });
        }

        info!(user_id = %user_id, %category, "Extracted new fact");
        if let Err(e) = self.jobs.enqueue(Job::IndexMemory {
            user_id,
            text: text.clone(),
            category,
        }) {
            warn!(user_id = %user_id, error = %e, "Could not queue memory for indexing");
        }
        Ok(ExtractionOutcome::Created { text, category })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::JobQueueError;
    use crate::domain::llm::{FinishReason, GenerationResponse, LLMProvider, TokenUsage};
    use crate::infrastructure::event_bus::EventBus;
    use async_trait::async_trait;
    use lifeos_cortex::application::StandardMemoryService;
    use lifeos_cortex::infrastructure::InMemoryMemoryRepository;
    use parking_lot::Mutex;

    struct CannedProvider(&'static str);

    #[async_trait]
    impl LLMProvider for CannedProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            Ok(GenerationResponse {
                text: self.0.to_string(),
                usage: TokenUsage::default(),
                provider: "canned".into(),
                model: "test".into(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<Job>>,
    }

    impl JobQueue for RecordingQueue {
        fn enqueue(&self, job: Job) -> Result<(), JobQueueError> {
            self.jobs.lock().push(job);
            Ok(())
        }
    }

    fn extractor(reply: &'static str) -> (FactExtractor, Arc<RecordingQueue>) {
        let mut registry = ProviderRegistry::default();
        registry.register("canned", "default", "test", Arc::new(CannedProvider(reply)));
        let memory = StandardMemoryService::new(
            Arc::new(InMemoryMemoryRepository::new()),
            Arc::new(EventBus::new(16)),
        );
        let queue = Arc::new(RecordingQueue::default());
        let extractor = FactExtractor::new(
            Arc::new(registry),
            Arc::new(PromptTemplateEngine::new().unwrap()),
            Arc::new(memory),
            queue.clone(),
            "default",
        );
        (extractor, queue)
    }

    #[tokio::test]
    async fn test_new_fact_is_stored_and_queued_for_indexing() {
        let (extractor, queue) =
            extractor(r#"{"found": true, "fact": "I am vegetarian", "category": "constraint"}"#);
        let user = UserId::new();

        let first = extractor.extract(user, "btw I'm vegetarian").await.unwrap();
        assert_eq!(
            first,
            ExtractionOutcome::Created {
                text: "I am vegetarian".into(),
                category: MemoryCategory::Constraint
            }
        );

        let second = extractor.extract(user, "still vegetarian").await.unwrap();
        assert!(matches!(second, ExtractionOutcome::Reinforced { .. }));

        let jobs = queue.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert!(matches!(&jobs[0], Job::IndexMemory { text, .. } if text == "I am vegetarian"));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let (extractor, queue) = extractor(r#"```json
{"found": false, "fact": "", "category": "goal"}
```"#);
        let outcome = extractor.extract(UserId::new(), "hello there").await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::NothingFound);
        assert!(queue.jobs.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_category_defaults_to_preference() {
        let (extractor, _) = extractor(r#"{"found": "true", "fact": "Loves sci-fi", "category": "hobby"}"#);
        let outcome = extractor.extract(UserId::new(), "I love sci-fi").await.unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::Created { category: MemoryCategory::Preference, .. }
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let (extractor, _) = extractor("I could not decide");
        let err = extractor.extract(UserId::new(), "hm").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }
}
