//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the main chat LLM.
//! It implements the `ChatModelService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use progress_core::{
    domain::{AiMode, GenerationRequest},
    ports::{ChatModelService, PortError, PortResult},
    prompt::render_chat_prompt,
};
use tracing::debug;

use super::classify_openai_error;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn user_content(text: String, attachment: Option<&str>) -> ChatCompletionRequestUserMessageContent {
        match attachment.filter(|uri| uri.starts_with("data:image/")) {
            Some(image_uri) => ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText { text },
                ),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: image_uri.to_string(),
                            detail: None,
                        },
                    },
                ),
            ]),
            None => ChatCompletionRequestUserMessageContent::Text(text),
        }
    }
}

//=========================================================================================
// `ChatModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatModelService for OpenAiChatAdapter {
    async fn generate_response(&self, request: &GenerationRequest) -> PortResult<String> {
        let prompt = render_chat_prompt(request);
        debug!(
            conversation_id = %request.conversation_id,
            mode = ?request.mode,
            has_attachment = request.attachment_data_uri.is_some(),
            "Requesting chat completion"
        );

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::user_content(
                    prompt.user,
                    request.attachment_data_uri.as_deref(),
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let max_tokens: u32 = match request.mode {
            AiMode::ThinkDeep => 4096,
            _ => 1500,
        };

        let completion = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(max_tokens)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(completion)
            .await
            .map_err(classify_openai_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        content.ok_or_else(|| {
            PortError::Unexpected("Chat LLM response contained no text content.".to_string())
        })
    }
}
