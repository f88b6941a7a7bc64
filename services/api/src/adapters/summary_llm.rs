//! services/api/src/adapters/summary_llm.rs
//!
//! Summarizes documents uploaded as data URIs. Images go to the model as
//! image input; text documents are decoded and sent inline.

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
    data_uri::DataUri,
    ports::{DocumentSummaryService, PortError, PortResult},
    prompt::render_summary_prompt,
};

use super::classify_openai_error;

/// Text documents longer than this are cut before being sent.
const MAX_DOCUMENT_CHARS: usize = 60_000;

#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSummaryAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn document_content(document_data_uri: &str) -> PortResult<ChatCompletionRequestUserMessageContent> {
        let document: DataUri = document_data_uri
            .parse()
            .map_err(|e| PortError::Unexpected(format!("Invalid document: {}", e)))?;

        if document.is_image() {
            return Ok(ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: "Document:".to_string(),
                    },
                ),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: document_data_uri.to_string(),
                            detail: None,
                        },
                    },
                ),
            ]));
        }

        let text = String::from_utf8(document.bytes).map_err(|_| {
            PortError::Unexpected(format!(
                "Documents of type '{}' cannot be summarized",
                document.mime_type
            ))
        })?;
        let text: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();
        Ok(ChatCompletionRequestUserMessageContent::Text(format!("Document: {}", text)))
    }
}

#[async_trait]
impl DocumentSummaryService for OpenAiSummaryAdapter {
    async fn summarize_document(&self, document_data_uri: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(render_summary_prompt())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(Self::document_content(document_data_uri)?)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
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
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("Summary LLM returned no text.".to_string()))
    }
}
