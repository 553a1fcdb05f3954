//! Static catalogue of analysis agents and the prompt scaffolding around them.
//!
//! The registry is pure data: it never drives control flow, it only tells the
//! orchestrator which roles exist and whether they may use web search.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::NewsLensError;

/// Article analysed when a request does not name one.
pub const DEFAULT_ARTICLE_URL: &str = "https://www.foxnews.com/us/charlie-kirk-assassination-timeline-utah-campus-shooting-details-attack-manhunt-suspect";

/// Audience the generated prose is written for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    #[default]
    Standard,
    Simple,
}

impl ReadingLevel {
    /// Lenient wire parsing: anything other than `"simple"` is standard.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("simple") => ReadingLevel::Simple,
            _ => ReadingLevel::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingLevel::Standard => "standard",
            ReadingLevel::Simple => "simple",
        }
    }

    fn readability_block(&self) -> &'static str {
        match self {
            ReadingLevel::Standard => {
                "\n<readability>Keep sentences concise. Prefer lists over long paragraphs. Avoid filler.</readability>"
            }
            ReadingLevel::Simple => {
                "\n<readability>Audience: person with limited news background. Use everyday words. Short sentences (max ~18 words). Define uncommon terms in parentheses. If something is unknown say \"Not clear\" instead of guessing. Prefer bullet lists. Avoid jargon.</readability>"
            }
        }
    }
}

/// One analysis role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub prompt_template: String,
    pub search_enabled: bool,
}

impl AgentSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt_template: prompt_template.into(),
            search_enabled: false,
        }
    }

    pub fn with_search(mut self) -> Self {
        self.search_enabled = true;
        self
    }
}

/// Ordered, immutable set of agent roles.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    specs: Vec<Arc<AgentSpec>>,
}

impl AgentRegistry {
    pub fn new(specs: Vec<AgentSpec>) -> Result<Self, NewsLensError> {
        if specs.is_empty() {
            return Err(NewsLensError::InvalidConfiguration(
                "agent registry must contain at least one agent".into(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &specs {
            if spec.id.trim().is_empty() {
                return Err(NewsLensError::InvalidConfiguration(
                    "agent id must not be empty".into(),
                ));
            }
            if !seen.insert(spec.id.clone()) {
                return Err(NewsLensError::InvalidConfiguration(format!(
                    "duplicate agent id: {}",
                    spec.id
                )));
            }
        }

        Ok(Self {
            specs: specs.into_iter().map(Arc::new).collect(),
        })
    }

    /// The five built-in critique roles.
    pub fn builtin() -> Self {
        Self {
            specs: builtin_specs().into_iter().map(Arc::new).collect(),
        }
    }

    pub fn specs(&self) -> &[Arc<AgentSpec>] {
        &self.specs
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AgentSpec>> {
        self.specs.iter().find(|spec| spec.id == id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn build_agent_system(template: &str, level: ReadingLevel) -> String {
    format!("{template}{}", level.readability_block())
}

pub fn build_summary_system(level: ReadingLevel) -> String {
    let extra = match level {
        ReadingLevel::Simple => {
            "Add a line at top: Plain Verdict: (one short sentence). Use very clear words. Keep total under 160 words. Avoid abstractions."
        }
        ReadingLevel::Standard => "Keep it compact and structured for fast scanning.",
    };
    format!(
        "{SUMMARY_SYSTEM_BASE}\n{extra}{}",
        level.readability_block()
    )
}

const SUMMARY_SYSTEM_BASE: &str = "Give a short, clear verdict for someone who doesn't follow news closely. Rate trustworthiness, highlight biggest concerns, explain what to double-check. Keep under 300 words total. Format: **Trust Level**, **Main Concerns**, **What to Verify**.";

fn builtin_specs() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new("credibility", "Source Credibility", CREDIBILITY_PROMPT),
        AgentSpec::new(
            "facts_vs_interpretation",
            "Facts vs Interpretation",
            FACTS_PROMPT,
        )
        .with_search(),
        AgentSpec::new("cui_bono", "Who Benefits", CUI_BONO_PROMPT),
        AgentSpec::new("omissions", "What's Missing", OMISSIONS_PROMPT).with_search(),
        AgentSpec::new("rhetoric", "Emotional Tricks", RHETORIC_PROMPT),
    ]
}

const CREDIBILITY_PROMPT: &str = r#"<role>Assess publication and author trust signals ONLY.</role>
<input_spec>You receive full article markdown (and optional factual search snippets if tool invoked).</input_spec>
<task>Identify provenance, sourcing quality, and concrete red flags. Do NOT analyze rhetoric, omissions, emotional tone, fact vs opinion splits, or motives. If information is absent, write "Not stated". Never guess.</task>
<output_format markdown="gfm">Produce ONLY these markdown sections and nothing else:
**Who Published This**
Ownership / publication type / obvious leaning if clearly established or widely known (only if obvious).
**Where Info Came From**
Bullet list of cited sources (official statements, eyewitness, third-party outlets). If missing: None clearly cited.
**Any Red Flags**
Bullet list of concrete sourcing or transparency issues. If none: None evident.
**Can You Trust It?**
1-3 short sentences: balanced, cautious verdict. No new evidence or repetition.</output_format>
<rules>
<rule>Use ONLY provided article + explicit search snippets if tool used.</rule>
<rule>No extra sections, greetings, or meta commentary.</rule>
<rule>No speculation beyond text evidence.</rule>
<rule>If scope overlap with other agents arises, still output required headings focused on credibility only.</rule>
</rules>
<forbidden>Introducing new sections; moral judgments; invented sources; cross-agent analysis.</forbidden>"#;

const FACTS_PROMPT: &str = r#"<role>Separate verifiable factual claims from interpretation or speculation ONLY.</role>
<exclusions>Do not judge credibility, do not analyze rhetoric/emotion, do not infer motives.</exclusions>
<output_format markdown="gfm">Return ONLY:
**What We Know for Sure**
Bullet list: explicit concrete facts (entities, dates, figures). Each bullet = single fact. If none: None established.
**Writer's Opinions**
Bullet list: subjective / evaluative / framing language. If none: None notable.
**Unclear Claims**
Bullet list: vague / unsubstantiated / probabilistic statements needing verification. If none: None.</output_format>
<rules>
<rule>Rephrase; avoid copying long verbatim sentences unless essential.</rule>
<rule>No extra narrative outside the three sections.</rule>
<rule>If unverifiable from text, place in Unclear Claims.</rule>
<rule>No redundancy; each bullet unique.</rule>
</rules>
<forbidden>Speculation, credibility judgments, emotional tone assessment, added sections.</forbidden>"#;

const CUI_BONO_PROMPT: &str = r#"<role>Identify plausible beneficiaries or strategic interests implied by article timing/content.</role>
<exclusions>Do not restate raw fact inventory (other agents). Do not perform emotional/rhetorical analysis. Avoid conspiracy framing.</exclusions>
<output_format markdown="gfm">Output ONLY:
**Who Wins**
Bullet list: actors/groups plausibly advantaged. Mark uncertain items with (uncertain).
**Why Now**
1-3 bullets: timing/context signals. If not clear: Not obvious from text.
**Hidden Motives**
Bullet list: potential strategic angles explicitly suggested or strongly implied. If none: None apparent.</output_format>
<rules>
<rule>Ground every point in article content (or explicit search snippet). Label uncertainty.</rule>
<rule>Each bullet ideally 18 words or fewer.</rule>
<rule>No additional commentary or sections.</rule>
</rules>
<forbidden>Factual claim re-listing, emotional tone critique, speculative conspiracy narratives.</forbidden>"#;

const OMISSIONS_PROMPT: &str = r#"<role>Identify missing data, absent viewpoints, and omitted contextual background aiding interpretation.</role>
<exclusions>Do not judge tone (rhetoric) or overall trust (credibility).</exclusions>
<output_format markdown="gfm">Return ONLY:
**Missing Facts**
Bullet list: concrete needed data not supplied (figures, timelines, definitions). If none: None obvious.
**Other Side of Story**
Bullet list: stakeholders / perspectives not presented. If none: None clearly missing.
**Important Context Left Out**
Bullet list: historical / comparative / legal context whose absence limits understanding. If none: None identified.</output_format>
<rules>
<rule>Write neutrally ("No casualty numbers provided").</rule>
<rule>Do not invent numbers or unnamed sources.</rule>
<rule>No narrative outside bullet lists.</rule>
</rules>
<forbidden>Tone critique, credibility judgments, speculative motives.</forbidden>"#;

const RHETORIC_PROMPT: &str = r#"<role>Analyze persuasive and emotional framing only.</role>
<exclusions>Do not classify factual accuracy, credibility, omissions, or beneficiaries.</exclusions>
<output_format markdown="gfm">Produce ONLY:
**Emotional Language**
Bullet list: short quoted or paraphrased charged phrases. If none: Minimal.
**Scare Tactics**
Bullet list: fear / alarm amplifiers (hyperbole, catastrophe framing). If none: None detected.
**Manipulation Attempts**
Bullet list: bias techniques (loaded question, false balance, insinuation, repetition). If none: None observed.</output_format>
<rules>
<rule>Quotes under 12 words or paraphrase.</rule>
<rule>No extra commentary or concluding summary.</rule>
<rule>Stay strictly within emotional/persuasive scope.</rule>
</rules>
<forbidden>Adding new sections; judging credibility; detailing omissions; motive speculation.</forbidden>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogue_has_five_roles_in_order() {
        let registry = AgentRegistry::builtin();
        let ids: Vec<&str> = registry.specs().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "credibility",
                "facts_vs_interpretation",
                "cui_bono",
                "omissions",
                "rhetoric"
            ]
        );
        let searchers: Vec<&str> = registry
            .specs()
            .iter()
            .filter(|s| s.search_enabled)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(searchers, vec!["facts_vs_interpretation", "omissions"]);
    }

    #[test]
    fn rejects_duplicate_and_empty_catalogues() {
        assert!(AgentRegistry::new(Vec::new()).is_err());
        let dup = vec![
            AgentSpec::new("a", "A", "x"),
            AgentSpec::new("a", "Again", "y"),
        ];
        assert!(AgentRegistry::new(dup).is_err());
    }

    #[test]
    fn reading_level_parsing_is_lenient() {
        assert_eq!(ReadingLevel::from_wire(Some("simple")), ReadingLevel::Simple);
        assert_eq!(ReadingLevel::from_wire(Some("standard")), ReadingLevel::Standard);
        assert_eq!(ReadingLevel::from_wire(Some("SIMPLE")), ReadingLevel::Standard);
        assert_eq!(ReadingLevel::from_wire(None), ReadingLevel::Standard);
    }

    #[test]
    fn system_prompts_carry_readability_block() {
        let system = build_agent_system("<role>x</role>", ReadingLevel::Simple);
        assert!(system.starts_with("<role>x</role>"));
        assert!(system.contains("limited news background"));

        let summary = build_summary_system(ReadingLevel::Standard);
        assert!(summary.contains("**Trust Level**"));
        assert!(summary.contains("compact and structured"));
    }
}
