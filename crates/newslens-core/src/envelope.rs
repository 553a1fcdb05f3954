//! Recovery of the designated markdown payload from free-form model output.
//!
//! Agents are asked to answer inside
//! `<agentOutput><markdown><![CDATA[ ... ]]></markdown></agentOutput>`.
//! Extraction never fails: when the envelope is missing or malformed the raw
//! text is used verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::query::unescape_xml;

static OUTPUT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<agentOutput\b[^>]*>(.*?)</agentOutput>").expect("invalid envelope regex")
});
static MARKDOWN_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<markdown\b[^>]*>(.*?)</markdown>").expect("invalid markdown regex")
});
static CDATA_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("invalid cdata regex"));

/// Cleaned payload, or `None` when the envelope is absent, malformed or blank.
pub fn try_extract_payload(raw: &str) -> Option<String> {
    let output = OUTPUT_BLOCK.captures(raw)?.get(1)?.as_str();
    let markdown = MARKDOWN_BLOCK.captures(output)?.get(1)?.as_str();

    let payload = if markdown.contains("<![CDATA[") {
        let sections: Vec<&str> = CDATA_BLOCK
            .captures_iter(markdown)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        if sections.is_empty() {
            return None;
        }
        sections.concat()
    } else {
        unescape_xml(markdown)
    };

    let payload = payload.trim();
    (!payload.is_empty()).then(|| payload.to_string())
}

/// The definite final markdown for an agent: extracted payload or raw text.
pub fn final_markdown(raw: &str) -> String {
    try_extract_payload(raw).unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cdata_payload() {
        let raw = "preamble\n<agentOutput>\n<markdown><![CDATA[\n**Who Wins**\n- a < b\n]]></markdown>\n</agentOutput>\ntrailing";
        assert_eq!(
            try_extract_payload(raw).as_deref(),
            Some("**Who Wins**\n- a < b")
        );
    }

    #[test]
    fn extracts_plain_payload_with_entities() {
        let raw = "<agentOutput><markdown>Tom &amp; Jerry</markdown></agentOutput>";
        assert_eq!(try_extract_payload(raw).as_deref(), Some("Tom & Jerry"));
    }

    #[test]
    fn tolerates_attributes_and_case() {
        let raw = "<AgentOutput version=\"1\"><Markdown><![CDATA[ok]]></Markdown></AgentOutput>";
        assert_eq!(try_extract_payload(raw).as_deref(), Some("ok"));
    }

    #[test]
    fn missing_or_truncated_envelope_yields_none() {
        assert_eq!(try_extract_payload("just markdown"), None);
        assert_eq!(
            try_extract_payload("<agentOutput><markdown><![CDATA[cut off"),
            None
        );
        assert_eq!(
            try_extract_payload("<agentOutput><markdown><![CDATA[  ]]></markdown></agentOutput>"),
            None
        );
        assert_eq!(try_extract_payload("<agentOutput>no markdown</agentOutput>"), None);
    }

    #[test]
    fn final_markdown_falls_back_to_raw_text() {
        assert_eq!(final_markdown("raw **text**"), "raw **text**");
        assert_eq!(final_markdown(""), "");
        assert_eq!(
            final_markdown("<agentOutput><markdown>x</markdown></agentOutput>"),
            "x"
        );
    }
}
