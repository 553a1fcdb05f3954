use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{TextGenerator, TextStream};
use crate::error::ProviderError;
use crate::security::SecretValue;

/// Streaming chat completions against any OpenAI-compatible endpoint
/// (Cerebras by default).
pub struct OpenAiCompatGenerator {
    client: Option<Client<OpenAIConfig>>,
    model: String,
    api_key_env: String,
}

impl OpenAiCompatGenerator {
    /// Without a key every call fails with `NotConfigured`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<SecretValue>,
        api_key_env: &str,
    ) -> Self {
        let client = api_key.map(|key| {
            let config = OpenAIConfig::new()
                .with_api_key(key.expose())
                .with_api_base(base_url.trim_end_matches('/'));
            Client::with_config(config)
        });

        Self {
            client,
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    async fn stream(&self, system: &str, prompt: &str) -> Result<TextStream, ProviderError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(self.api_key_env.clone()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
                    system.to_string(),
                )),
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
                    prompt.to_string(),
                )),
            ])
            .build()
            .map_err(|err| ProviderError::Decode(format!("chat request: {err}")))?;

        let mut upstream = client
            .chat()
            .create_stream(request)
            .await
            .map_err(|err| ProviderError::upstream("generation", err))?;

        debug!(model = %self.model, "generation stream opened");

        let stream = async_stream::stream! {
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(response) => {
                        let text: String = response
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Err(err) => {
                        yield Err(ProviderError::Stream(err.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
