//! Language model and prompt collaborators
//!
//! The pipeline talks to a model only through [`LanguageModel`] and builds
//! prompts only through [`PromptBuilder`], so both can be replaced in tests.

use crate::api::retriever::RetrievedContext;
use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

/// Single-turn completion: prompt in, response text out
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Turns a question and its retrieved context into a prompt
pub trait PromptBuilder: Send + Sync {
    fn build(&self, question: &str, context: &RetrievedContext) -> String;
}

impl<F> PromptBuilder for F
where
    F: Fn(&str, &RetrievedContext) -> String + Send + Sync,
{
    fn build(&self, question: &str, context: &RetrievedContext) -> String {
        self(question, context)
    }
}

/// Lists retrieved documents ahead of the question
#[derive(Debug, Clone)]
pub struct ContextPromptBuilder {
    pub instructions: String,
}

impl Default for ContextPromptBuilder {
    fn default() -> Self {
        Self {
            instructions: "Answer the question using only the context below. \
                If the context does not contain the answer, say so."
                .to_string(),
        }
    }
}

impl PromptBuilder for ContextPromptBuilder {
    fn build(&self, question: &str, context: &RetrievedContext) -> String {
        let documents = context
            .iter()
            .map(|result| format!("[{}]: {}", result.id, result.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}",
            self.instructions, documents, question
        )
    }
}

/// Chat completions from an OpenAI-compatible API
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Self {
        let api_key = config.resolved_api_key();
        let openai_config = if let Some(base_url) = config.base_url.as_deref() {
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        log::info!(
            "LLM: {} via {}",
            config.model,
            config.base_url.as_deref().unwrap_or("OpenAI")
        );

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn messages(&self, prompt: &str) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(system_prompt.clone()),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            },
        ));
        messages
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(self.messages(prompt))
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| {
                log::error!("No content in chat response: {:?}", response);
                RagError::LanguageModel("No content in response".to_string())
            })?;

        Ok(content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SearchResult;

    fn context() -> RetrievedContext {
        RetrievedContext::new(vec![
            SearchResult {
                id: "a".to_string(),
                text: "cats purr".to_string(),
                vector: vec![1.0],
                score: 0.9,
            },
            SearchResult {
                id: "b".to_string(),
                text: "dogs bark".to_string(),
                vector: vec![0.5],
                score: 0.5,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_context_prompt_lists_documents_in_order() {
        let prompt = ContextPromptBuilder::default().build("Who purrs?", &context());
        let a = prompt.find("[a]: cats purr").unwrap();
        let b = prompt.find("[b]: dogs bark").unwrap();
        assert!(a < b);
        assert!(prompt.ends_with("Question: Who purrs?"));
    }

    #[test]
    fn test_closure_prompt_builder() {
        let builder = |question: &str, context: &RetrievedContext| {
            format!("{} ({} docs)", question, context.len())
        };
        assert_eq!(builder.build("q", &context()), "q (2 docs)");
    }

    #[test]
    fn test_system_prompt_is_optional() {
        let mut config = LlmConfig {
            api_key: "test".to_string(),
            ..Default::default()
        };
        assert_eq!(OpenAiChat::new(&config).messages("hi").len(), 1);

        config.system_prompt = Some("be brief".to_string());
        assert_eq!(OpenAiChat::new(&config).messages("hi").len(), 2);
    }
}
