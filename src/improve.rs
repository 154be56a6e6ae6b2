//! Ask a model to rewrite a prompt, and make sense of whatever shape the
//! answer comes back in.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::ChatlistError;

const PLACEHOLDER: &str = "{prompt}";
const MAX_ALTERNATIVES: usize = 3;
const MIN_LINE_CHARS: usize = 10;
const FALLBACK_CHARS: usize = 500;

const IMPROVE_TEMPLATE: &str = r#"You are an expert at writing prompts for AI models.

The user's original prompt:
"{prompt}"

Task:
1. Improve this prompt: make it clearer, more specific and more effective.
2. Suggest 2-3 alternative phrasings.
3. Where it makes sense, adapt the prompt for technical, analytical and creative tasks.

Reply with JSON only:
{
    "improved": "improved version of the prompt",
    "alternatives": ["variant 1", "variant 2", "variant 3"],
    "technical": "version for technical tasks, or null",
    "analytical": "version for analytical tasks, or null",
    "creative": "version for creative tasks, or null"
}"#;

const TECHNICAL_TEMPLATE: &str = r#"Rewrite the following prompt for a technical or programming task. Make it precise and structured:

"{prompt}"

Reply with the rewritten prompt only, without explanations."#;

const ANALYTICAL_TEMPLATE: &str = r#"Adapt the following prompt for an analytical or research task. Add structure and clear evaluation criteria:

"{prompt}"

Reply with the rewritten prompt only, without explanations."#;

const CREATIVE_TEMPLATE: &str = r#"Rewrite the following prompt for a creative task. Make it inspiring and open to creative solutions:

"{prompt}"

Reply with the rewritten prompt only, without explanations."#;

/// Meta-prompt asking for an improved prompt plus variants, as JSON.
pub fn improvement_prompt(original: &str) -> String {
    IMPROVE_TEMPLATE.replace(PLACEHOLDER, original)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adaptation {
    Technical,
    Analytical,
    Creative,
}

impl Adaptation {
    pub fn prompt(self, original: &str) -> String {
        let template = match self {
            Self::Technical => TECHNICAL_TEMPLATE,
            Self::Analytical => ANALYTICAL_TEMPLATE,
            Self::Creative => CREATIVE_TEMPLATE,
        };
        template.replace(PLACEHOLDER, original)
    }
}

impl FromStr for Adaptation {
    type Err = ChatlistError;

    fn from_str(name: &str) -> Result<Self, ChatlistError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "technical" | "tech" => Ok(Self::Technical),
            "analytical" => Ok(Self::Analytical),
            "creative" => Ok(Self::Creative),
            other => Err(ChatlistError::InvalidCommand(format!(
                "unknown adaptation '{other}' (expected technical, analytical or creative)"
            ))),
        }
    }
}

/// Suggestions parsed out of an improvement reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Improvement {
    /// Display name of the provider that answered.
    pub provider: String,
    pub improved: String,
    pub alternatives: Vec<String>,
    pub technical: Option<String>,
    pub analytical: Option<String>,
    pub creative: Option<String>,
}

#[derive(Deserialize)]
struct Suggestions {
    improved: Option<String>,
    alternatives: Option<Vec<Option<String>>>,
    technical: Option<String>,
    analytical: Option<String>,
    creative: Option<String>,
}

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex"))
}

fn bare_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("object regex"))
}

fn list_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*•\d.)]+\s*").expect("marker regex"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// JSON in a fenced block, else the outermost `{...}`, else the whole text.
fn json_candidate(reply: &str) -> &str {
    if let Some(captures) = fenced_json().captures(reply) {
        if let Some(body) = captures.get(1) {
            return body.as_str();
        }
    }
    bare_json()
        .find(reply)
        .map_or(reply, |found| found.as_str())
}

/// Read the model's reply. Well-formed JSON is taken field by field;
/// otherwise the reply is scanned for headed sections, and as a last resort
/// its head becomes the improved prompt.
pub fn parse_improvement(provider: &str, reply: &str) -> Improvement {
    let mut improvement = match serde_json::from_str::<Suggestions>(json_candidate(reply)) {
        Ok(suggestions) => Improvement {
            provider: String::new(),
            improved: non_blank(suggestions.improved).unwrap_or_default(),
            alternatives: suggestions
                .alternatives
                .unwrap_or_default()
                .into_iter()
                .filter_map(non_blank)
                .collect(),
            technical: non_blank(suggestions.technical),
            analytical: non_blank(suggestions.analytical),
            creative: non_blank(suggestions.creative),
        },
        Err(e) => {
            tracing::debug!("improvement reply is not JSON ({e}); scanning sections");
            scan_sections(reply)
        }
    };

    if improvement.improved.is_empty() {
        improvement.improved = reply.trim().chars().take(FALLBACK_CHARS).collect();
    }
    improvement.provider = provider.to_owned();
    improvement
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Improved,
    Alternatives,
    Technical,
    Analytical,
    Creative,
}

fn heading(line: &str) -> Option<Section> {
    let lower = line.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["improved", "recommended"]) {
        Some(Section::Improved)
    } else if has(&["alternative", "variant"]) {
        Some(Section::Alternatives)
    } else if has(&["technical"]) {
        Some(Section::Technical)
    } else if has(&["analytical"]) {
        Some(Section::Analytical)
    } else if has(&["creative"]) {
        Some(Section::Creative)
    } else {
        None
    }
}

fn scan_sections(reply: &str) -> Improvement {
    let mut improvement = Improvement::default();
    let mut section = Section::Preamble;

    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(next) = heading(line) {
            section = next;
            continue;
        }
        let clean = list_marker().replace(line, "");
        let clean = clean.trim();
        if clean.chars().count() <= MIN_LINE_CHARS {
            continue;
        }
        let slot = match section {
            Section::Preamble => continue,
            Section::Alternatives => {
                if improvement.alternatives.len() < MAX_ALTERNATIVES {
                    improvement.alternatives.push(clean.to_owned());
                }
                continue;
            }
            Section::Improved if improvement.improved.is_empty() => {
                improvement.improved = clean.to_owned();
                continue;
            }
            Section::Improved => continue,
            Section::Technical => &mut improvement.technical,
            Section::Analytical => &mut improvement.analytical,
            Section::Creative => &mut improvement.creative,
        };
        if slot.is_none() {
            *slot = Some(clean.to_owned());
        }
    }
    improvement
}
