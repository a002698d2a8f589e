//! RAG orchestration and structured-output extraction
//!
//! [`RagPipeline::answer`] runs retrieve -> build prompt -> one model call.
//! Nothing is retried and no fallback answer is made up: an empty retrieval
//! surfaces as [`RagError::NoRelevantDataFound`] and the model is not called.
//! Dropping the returned future cancels a pending model call; the store is
//! never written on this path.

use crate::api::chat::{LanguageModel, PromptBuilder};
use crate::api::retriever::{RagQuery, Retrieve};
use crate::error::{RagError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Reply shown when retrieval finds nothing
pub const INSUFFICIENT_INFORMATION: &str =
    "I couldn't find enough relevant information in the knowledge base to answer that.";

/// Leading format tag: everything up to whitespace or the start of a JSON
/// object/array.
static FENCE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s\[{]+").expect("fence tag pattern is valid"));

/// Outcome of [`RagPipeline::answer_or_decline`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Model response grounded in retrieved documents
    Answered(String),
    /// Retrieval found nothing to ground an answer on
    InsufficientInformation,
}

impl Answer {
    pub fn is_answered(&self) -> bool {
        matches!(self, Answer::Answered(_))
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Answered(text) => f.write_str(text),
            Answer::InsufficientInformation => f.write_str(INSUFFICIENT_INFORMATION),
        }
    }
}

/// Retriever, prompt builder and language model wired together
pub struct RagPipeline {
    retriever: Arc<dyn Retrieve>,
    prompt_builder: Arc<dyn PromptBuilder>,
    llm: Arc<dyn LanguageModel>,
}

impl RagPipeline {
    pub fn new(
        retriever: Arc<dyn Retrieve>,
        prompt_builder: Arc<dyn PromptBuilder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            retriever,
            prompt_builder,
            llm,
        }
    }

    /// Answer a question from retrieved documents
    pub async fn answer(&self, query: &RagQuery) -> Result<String> {
        let context = self
            .retriever
            .retrieve(query.content(), query.num_results, &query.time_filter)
            .await?;

        let prompt = self.prompt_builder.build(&query.question, &context);
        log::debug!(
            "Prompt built from {} documents ({} chars)",
            context.len(),
            prompt.len()
        );

        self.llm.complete(&prompt).await
    }

    /// Answer and decode the response as structured data
    pub async fn answer_structured<T: DeserializeOwned>(&self, query: &RagQuery) -> Result<T> {
        let raw = self.answer(query).await?;
        extract_structured_as(&raw)
    }

    /// Like [`answer`](Self::answer), but an empty retrieval becomes
    /// [`Answer::InsufficientInformation`] instead of an error
    pub async fn answer_or_decline(&self, query: &RagQuery) -> Result<Answer> {
        match self.answer(query).await {
            Ok(text) => Ok(Answer::Answered(text)),
            Err(RagError::NoRelevantDataFound) => Ok(Answer::InsufficientInformation),
            Err(e) => Err(e),
        }
    }
}

/// Parse model output as JSON, tolerating a surrounding code fence
pub fn extract_structured(raw: &str) -> Result<serde_json::Value> {
    extract_structured_as(raw)
}

/// Parse model output into `T`, tolerating a surrounding code fence.
///
/// Leading and trailing backtick runs are removed, then a leading format tag
/// (`json`, `JSON`, `yaml`...) if the text does not parse with it. The raw
/// text is kept in the error for diagnostics.
pub fn extract_structured_as<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let (body, untagged) = strip_code_fence(raw);

    let first_error = match serde_json::from_str(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let error = match untagged.map(serde_json::from_str) {
        Some(Ok(value)) => return Ok(value),
        Some(Err(e)) => e,
        None => first_error,
    };

    Err(RagError::MalformedOutput {
        reason: error.to_string(),
        raw: raw.to_string(),
    })
}

/// Remove the fence. Returns the body and, when it starts with a tag, the
/// body with that tag removed.
fn strip_code_fence(raw: &str) -> (&str, Option<&str>) {
    let trimmed = raw.trim();
    let body = if trimmed.starts_with('`') {
        trimmed.trim_matches('`').trim()
    } else {
        trimmed
    };

    let untagged = FENCE_TAG.find(body).and_then(|tag| {
        let rest = body[tag.end()..].trim();
        (!rest.is_empty()).then_some(rest)
    });

    (body, untagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retriever::{QueryContent, RetrievedContext};
    use crate::storage::{SearchResult, TimeFilter};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    struct FixedRetriever(Vec<SearchResult>);

    #[async_trait]
    impl Retrieve for FixedRetriever {
        async fn retrieve(
            &self,
            _content: QueryContent<'_>,
            _num_results: usize,
            _time_filter: &TimeFilter,
        ) -> Result<RetrievedContext> {
            RetrievedContext::new(self.0.clone()).ok_or(RagError::NoRelevantDataFound)
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    fn result(id: &str, text: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            text: text.to_string(),
            vector: vec![0.0],
            score: 1.0,
        }
    }

    fn pipeline(results: Vec<SearchResult>, model: Arc<RecordingModel>) -> RagPipeline {
        let builder = |question: &str, context: &RetrievedContext| {
            let texts: Vec<&str> = context.iter().map(|r| r.text.as_str()).collect();
            format!("{} | {}", texts.join(","), question)
        };
        RagPipeline::new(Arc::new(FixedRetriever(results)), Arc::new(builder), model)
    }

    fn wrap_in_fence(body: &str, tag: &str) -> String {
        format!("```{}\n{}\n```", tag, body)
    }

    #[tokio::test]
    async fn test_answer_builds_prompt_and_calls_model_once() {
        let model = Arc::new(RecordingModel {
            response: "purring".to_string(),
            ..Default::default()
        });
        let rag = pipeline(vec![result("a", "cats purr")], model.clone());

        let answer = rag.answer(&RagQuery::new("what do cats do?")).await.unwrap();
        assert_eq!(answer, "purring");
        assert_eq!(*model.prompts.lock(), vec!["cats purr | what do cats do?".to_string()]);
    }

    #[tokio::test]
    async fn test_no_data_skips_model() {
        let model = Arc::new(RecordingModel::default());
        let rag = pipeline(vec![], model.clone());

        let result = rag.answer(&RagQuery::new("anything")).await;
        assert!(matches!(result, Err(RagError::NoRelevantDataFound)));
        assert!(model.prompts.lock().is_empty());

        let declined = rag.answer_or_decline(&RagQuery::new("anything")).await.unwrap();
        assert_eq!(declined, Answer::InsufficientInformation);
        assert_eq!(declined.to_string(), INSUFFICIENT_INFORMATION);
    }

    #[tokio::test]
    async fn test_answer_structured() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Event {
            name: String,
            year: i32,
        }

        let model = Arc::new(RecordingModel {
            response: "```json\n[{\"name\": \"launch\", \"year\": 2024}]\n```".to_string(),
            ..Default::default()
        });
        let rag = pipeline(vec![result("a", "launch in 2024")], model);

        let events: Vec<Event> = rag.answer_structured(&RagQuery::new("events?")).await.unwrap();
        assert_eq!(
            events,
            vec![Event {
                name: "launch".to_string(),
                year: 2024
            }]
        );
    }

    #[test]
    fn test_fence_round_trip_for_any_tag() {
        let values = vec![
            json!([{"key": "a", "value": 1}, {"key": "b", "value": null}]),
            json!({"nested": {"list": [1, 2, 3]}, "text": "with `ticks` inside"}),
            json!("plain string"),
            json!(42),
            json!(true),
            json!(null),
        ];
        let tags = ["", "json", "JSON", "json5", "c++", "5"];

        for value in &values {
            let body = serde_json::to_string_pretty(value).unwrap();
            for tag in tags {
                let wrapped = wrap_in_fence(&body, tag);
                assert_eq!(&extract_structured(&wrapped).unwrap(), value, "tag {:?}", tag);
            }
        }
    }

    #[test]
    fn test_unfenced_and_inline_fences() {
        assert_eq!(extract_structured("  [1, 2] ").unwrap(), json!([1, 2]));
        assert_eq!(extract_structured("```[1, 2]```").unwrap(), json!([1, 2]));
        assert_eq!(
            extract_structured("```json{\"a\": 1}```").unwrap(),
            json!({"a": 1})
        );
        assert_eq!(extract_structured("```true```").unwrap(), json!(true));
        assert_eq!(extract_structured("``` json\n[1]\n```").unwrap(), json!([1]));
    }

    #[test]
    fn test_tag_without_fence() {
        assert_eq!(extract_structured("json\n[1]").unwrap(), json!([1]));
        assert_eq!(
            extract_structured("JSON {\"a\": true}").unwrap(),
            json!({"a": true})
        );
        assert_eq!(extract_structured("\"json\"").unwrap(), json!("json"));
    }

    #[test]
    fn test_malformed_output_keeps_raw() {
        let raw = "```json\nthis is not json\n```";
        match extract_structured(raw) {
            Err(RagError::MalformedOutput { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("expected MalformedOutput, got {:?}", other),
        }
        assert!(matches!(
            extract_structured("Sure! Here you go."),
            Err(RagError::MalformedOutput { .. })
        ));
    }
}
