//! services/api/src/adapters/image.rs
//!
//! Image generation through the OpenAI images endpoint. Results are requested
//! as base64 so they can be returned inline as data URIs.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};
use async_trait::async_trait;
use progress_core::ports::{ImageGenerationService, PortError, PortResult};

use super::classify_openai_error;

#[derive(Clone)]
pub struct OpenAiImageAdapter {
    client: Client<OpenAIConfig>,
    model: ImageModel,
}

impl OpenAiImageAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: &str) -> Self {
        let model = match model {
            "dall-e-2" => ImageModel::DallE2,
            "dall-e-3" => ImageModel::DallE3,
            other => ImageModel::Other(other.to_string()),
        };
        Self { client, model }
    }
}

#[async_trait]
impl ImageGenerationService for OpenAiImageAdapter {
    async fn generate_image(&self, prompt: &str) -> PortResult<String> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(self.model.clone())
            .n(1)
            .size(ImageSize::S1024x1024)
            .response_format(ImageResponseFormat::B64Json)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        match response.data.first().map(|image| image.as_ref()) {
            Some(Image::B64Json { b64_json, .. }) => Ok(format!("data:image/png;base64,{}", b64_json)),
            Some(Image::Url { .. }) => Err(PortError::Unexpected(
                "Image generation returned a URL instead of inline data.".to_string(),
            )),
            None => Err(PortError::Unexpected(
                "Image generation failed to return an image.".to_string(),
            )),
        }
    }
}
