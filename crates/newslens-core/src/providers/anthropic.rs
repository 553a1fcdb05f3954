use async_trait::async_trait;
use claude_sdk::{ClaudeClient, ContentBlock, Message, MessagesRequest, Tool};
use serde_json::Value;
use tracing::debug;

use super::StructuredGenerator;
use crate::error::ProviderError;
use crate::security::SecretValue;

const TOOL_NAME: &str = "record_result";
const TOOL_INSTRUCTION: &str =
    "Respond only by calling the record_result tool exactly once with the complete result.";

/// Structured generation through the Anthropic messages API. The schema is
/// exposed as the only tool; its input is the generated object.
pub struct AnthropicStructuredGenerator {
    client: Option<ClaudeClient>,
    model: String,
    api_key_env: String,
    max_tokens: u32,
}

impl AnthropicStructuredGenerator {
    pub fn new(
        model: &str,
        api_key: Option<SecretValue>,
        api_key_env: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: api_key.map(|key| ClaudeClient::anthropic(key.expose().to_string())),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            max_tokens,
        }
    }

    fn build_request(&self, system: &str, prompt: &str, schema: &Value) -> MessagesRequest {
        MessagesRequest::new(
            self.model.clone(),
            self.max_tokens,
            vec![Message::user(prompt.to_string())],
        )
        .with_system(format!("{system}\n\n{TOOL_INSTRUCTION}"))
        .with_tools(vec![result_tool(schema)])
    }
}

fn result_tool(schema: &Value) -> Tool {
    Tool {
        name: TOOL_NAME.to_string(),
        description: "Record the structured result.".to_string(),
        input_schema: schema.clone(),
        disable_user_input: None,
        input_examples: None,
        cache_control: None,
    }
}

/// Input of the first `record_result` call among the response blocks.
fn tool_input(content: &[ContentBlock]) -> Option<Value> {
    content.iter().find_map(|block| match block {
        ContentBlock::ToolUse { name, input, .. } if name == TOOL_NAME => Some(input.clone()),
        _ => None,
    })
}

#[async_trait]
impl StructuredGenerator for AnthropicStructuredGenerator {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(self.api_key_env.clone()))?;

        let response = client
            .send_message(self.build_request(system, prompt, schema))
            .await
            .map_err(|err| ProviderError::upstream("synthesis", err))?;

        let input = tool_input(&response.content)
            .ok_or_else(|| ProviderError::Decode("no structured object in response".into()))?;

        debug!(model = %self.model, "structured generation completed");
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_becomes_the_only_tool() {
        let schema = json!({"type": "object", "required": ["trustLevel"]});
        let tool = result_tool(&schema);
        assert_eq!(tool.name, TOOL_NAME);
        assert_eq!(tool.input_schema, schema);
    }

    #[test]
    fn picks_tool_input_and_ignores_text() {
        let content: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "text", "text": "thinking"},
            {"type": "tool_use", "id": "toolu_1", "name": TOOL_NAME, "input": {"trustLevel": "low"}}
        ]))
        .unwrap();
        assert_eq!(tool_input(&content), Some(json!({"trustLevel": "low"})));

        let text_only: Vec<ContentBlock> =
            serde_json::from_value(json!([{"type": "text", "text": "no tool"}])).unwrap();
        assert_eq!(tool_input(&text_only), None);
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let generator = AnthropicStructuredGenerator::new("claude-test", None, "ANTHROPIC_API_KEY", 512);
        let err = generator
            .generate("s", "p", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
