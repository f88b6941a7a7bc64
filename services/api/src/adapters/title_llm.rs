//! services/api/src/adapters/title_llm.rs
//!
//! Names new conversations from their first message.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use progress_core::{
    ports::{PortError, PortResult, TitleGenerationService},
    prompt::{clean_title, render_title_prompt},
};

use super::classify_openai_error;

/// Only the start of a long first message is needed to name the conversation.
const PREVIEW_CHARS: usize = 1000;

pub struct OpenAiTitleAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTitleAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl TitleGenerationService for OpenAiTitleAdapter {
    async fn generate_title(&self, first_message: &str) -> PortResult<String> {
        let preview = first_message.chars().take(PREVIEW_CHARS).collect::<String>();
        let prompt = render_title_prompt(&preview);

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.system)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.user)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(20u32)
            .temperature(0.7)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .and_then(clean_title)
            .ok_or_else(|| PortError::Unexpected("No title generated".to_string()))
    }
}
