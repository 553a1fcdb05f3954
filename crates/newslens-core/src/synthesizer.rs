//! Merges every agent's markdown into one schema-validated trust verdict.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::agent::AgentOutcome;
use crate::error::SynthesisError;
use crate::providers::StructuredGenerator;
use crate::registry::{ReadingLevel, build_summary_system};

pub const MAX_CONCERNS: usize = 5;
pub const MAX_TO_VERIFY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustVerdict {
    pub trust_level: TrustLevel,
    pub plain_verdict: String,
    pub main_concerns: Vec<String>,
    pub to_verify: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// JSON schema handed to the structured generator.
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "trustLevel": {"type": "string", "enum": ["high", "medium", "low", "uncertain"]},
            "plainVerdict": {"type": "string"},
            "mainConcerns": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_CONCERNS},
            "toVerify": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_TO_VERIFY},
            "notes": {"type": "string"}
        },
        "required": ["trustLevel", "plainVerdict", "mainConcerns", "toVerify"]
    })
}

/// Accept an object only if it satisfies the verdict schema in full.
/// Keys outside the schema are dropped.
pub fn validate_verdict(value: Value) -> Result<TrustVerdict, SynthesisError> {
    let verdict: TrustVerdict = serde_json::from_value(value)
        .map_err(|err| SynthesisError::SchemaViolation(err.to_string()))?;

    if verdict.main_concerns.len() > MAX_CONCERNS {
        return Err(SynthesisError::SchemaViolation(format!(
            "mainConcerns has {} items (max {MAX_CONCERNS})",
            verdict.main_concerns.len()
        )));
    }
    if verdict.to_verify.len() > MAX_TO_VERIFY {
        return Err(SynthesisError::SchemaViolation(format!(
            "toVerify has {} items (max {MAX_TO_VERIFY})",
            verdict.to_verify.len()
        )));
    }
    Ok(verdict)
}

/// Final text contributed by one agent to the synthesis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    pub id: String,
    pub name: String,
    pub markdown: String,
}

impl AgentOutput {
    /// Partial text is kept as-is; an agent with no text gets an explicit annotation.
    pub fn from_outcome(outcome: &AgentOutcome) -> Self {
        let markdown = if !outcome.markdown.trim().is_empty() {
            outcome.markdown.clone()
        } else if let Some(error) = outcome.error.as_ref() {
            format!("_No analysis available: {}_", error.reason)
        } else {
            "_No analysis available: the agent produced no output._".to_string()
        };
        Self {
            id: outcome.id.clone(),
            name: outcome.name.clone(),
            markdown,
        }
    }
}

#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn StructuredGenerator>,
    attempts: u8,
    attempt_timeout: Duration,
}

impl Synthesizer {
    /// `attempts` is clamped to one call plus at most one retry.
    pub fn new(generator: Arc<dyn StructuredGenerator>, attempts: u8) -> Self {
        Self {
            generator,
            attempts: attempts.clamp(1, 2),
            attempt_timeout: Duration::from_secs(120),
        }
    }

    /// Upper bound on a single structured-generation call.
    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub async fn synthesize(
        &self,
        outputs: &[AgentOutput],
        level: ReadingLevel,
    ) -> Result<TrustVerdict, SynthesisError> {
        let system = build_summary_system(level);
        let prompt = summary_prompt(outputs);
        let schema = verdict_schema();

        let mut attempt = 1;
        loop {
            let call = self.generator.generate(&system, &prompt, &schema);
            let result = match tokio::time::timeout(self.attempt_timeout, call).await {
                Ok(Ok(value)) => validate_verdict(value),
                Ok(Err(err)) => Err(SynthesisError::from(err)),
                Err(_) => Err(SynthesisError::TimedOut(self.attempt_timeout.as_secs())),
            };

            match result {
                Ok(verdict) => {
                    info!(
                        attempt,
                        trust_level = ?verdict.trust_level,
                        "verdict synthesized"
                    );
                    return Ok(verdict);
                }
                Err(err) if attempt < self.attempts => {
                    warn!(attempt, error = %err, "synthesis failed, retrying once");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn summary_prompt(outputs: &[AgentOutput]) -> String {
    let mut prompt = String::from(
        "Integrate specialist analyses below. Provide unbiased, concise output respecting schema.\n",
    );
    for output in outputs {
        prompt.push_str(&format!(
            "\n<agent id=\"{}\" name=\"{}\">\n<![CDATA[\n{}\n]]>\n</agent>",
            output.id,
            output.name,
            output.markdown.replace("]]>", "]]&gt;")
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<Result<Value, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<Value, ProviderError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StructuredGenerator for Scripted {
        async fn generate(&self, _s: &str, prompt: &str, _schema: &Value) -> Result<Value, ProviderError> {
            assert!(prompt.contains("<agent id=\"credibility\""));
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Decode("script exhausted".into())))
        }
    }

    fn good_verdict() -> Value {
        json!({
            "trustLevel": "medium",
            "plainVerdict": "Mostly sourced, some loaded language.",
            "mainConcerns": ["anonymous sources"],
            "toVerify": ["casualty count"]
        })
    }

    fn outputs() -> Vec<AgentOutput> {
        vec![AgentOutput {
            id: "credibility".into(),
            name: "Source Credibility".into(),
            markdown: "**Who Published This**\nA paper.".into(),
        }]
    }

    #[test]
    fn validation_accepts_schema_conformant_objects() {
        let verdict = validate_verdict(good_verdict()).unwrap();
        assert_eq!(verdict.trust_level, TrustLevel::Medium);
        assert_eq!(verdict.notes, None);
    }

    #[test]
    fn validation_rejects_bad_enum_missing_fields_and_long_lists() {
        let mut bad_level = good_verdict();
        bad_level["trustLevel"] = json!("excellent");
        assert!(matches!(
            validate_verdict(bad_level),
            Err(SynthesisError::SchemaViolation(_))
        ));

        let mut missing = good_verdict();
        missing.as_object_mut().unwrap().remove("plainVerdict");
        assert!(validate_verdict(missing).is_err());

        let mut long = good_verdict();
        long["mainConcerns"] = json!(["1", "2", "3", "4", "5", "6"]);
        assert!(validate_verdict(long).is_err());

        let mut long_verify = good_verdict();
        long_verify["toVerify"] = json!(["1", "2", "3", "4", "5", "6", "7"]);
        assert!(validate_verdict(long_verify).is_err());
    }

    #[test]
    fn unknown_keys_are_dropped_not_forbidden() {
        let mut extra = good_verdict();
        extra["confidence"] = json!(0.99);
        extra["sourcesChecked"] = json!(["https://a.example"]);

        let verdict = validate_verdict(extra).unwrap();
        let value = serde_json::to_value(&verdict).unwrap();
        assert!(value.get("confidence").is_none());
        assert!(value.get("sourcesChecked").is_none());
        assert!(verdict_schema().get("additionalProperties").is_none());
    }

    #[test]
    fn empty_outcomes_are_annotated() {
        use crate::error::TaskError;

        let failed = AgentOutcome {
            id: "rhetoric".into(),
            name: "Emotional Tricks".into(),
            markdown: String::new(),
            error: Some(TaskError::new("rhetoric", "rate limited")),
            duration_ms: 3,
        };
        assert_eq!(
            AgentOutput::from_outcome(&failed).markdown,
            "_No analysis available: rate limited_"
        );

        let partial = AgentOutcome {
            markdown: "half a thought".into(),
            ..failed.clone()
        };
        assert_eq!(AgentOutput::from_outcome(&partial).markdown, "half a thought");

        let silent = AgentOutcome {
            error: None,
            ..failed
        };
        assert!(AgentOutput::from_outcome(&silent).markdown.contains("no output"));
    }

    #[test]
    fn verdict_serializes_camel_case() {
        let verdict = validate_verdict(good_verdict()).unwrap();
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["trustLevel"], "medium");
        assert!(value.get("notes").is_none());
    }

    #[tokio::test]
    async fn retries_once_after_schema_violation() {
        let script = Scripted::new(vec![Ok(json!({"trustLevel": "nope"})), Ok(good_verdict())]);
        let synthesizer = Synthesizer::new(script.clone(), 2);
        let verdict = synthesizer
            .synthesize(&outputs(), ReadingLevel::Standard)
            .await
            .unwrap();
        assert_eq!(verdict.trust_level, TrustLevel::Medium);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn never_retries_more_than_once() {
        let script = Scripted::new(vec![
            Err(ProviderError::Stream("overloaded".into())),
            Err(ProviderError::Stream("overloaded".into())),
            Ok(good_verdict()),
        ]);
        let synthesizer = Synthesizer::new(script.clone(), 9);
        let err = synthesizer
            .synthesize(&outputs(), ReadingLevel::Simple)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Provider(_)));
        assert_eq!(script.calls(), 2);
    }

    struct Stalled;

    #[async_trait]
    impl StructuredGenerator for Stalled {
        async fn generate(&self, _s: &str, _p: &str, _schema: &Value) -> Result<Value, ProviderError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_provider_times_out_each_attempt() {
        let synthesizer =
            Synthesizer::new(Arc::new(Stalled), 2).with_timeout(Duration::from_millis(50));
        let err = synthesizer
            .synthesize(&outputs(), ReadingLevel::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::TimedOut(_)));
    }
}
