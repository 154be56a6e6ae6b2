//! Saved prompts and the history of saved results: tagging, ordering and
//! case-insensitive search over what the stores hold.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatlistError;
use crate::store::{PersistedResult, Record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPrompt {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SavedPrompt {
    pub fn new(text: &str, tags: Vec<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            text: text.to_owned(),
            tags,
            created_at: Utc::now(),
        }
    }
}

impl Record for SavedPrompt {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Split a comma-separated tag list. Blank entries and repeats are dropped;
/// first spelling wins.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_owned());
        }
    }
    tags
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptSort {
    #[default]
    Newest,
    Text,
    Tags,
}

impl FromStr for PromptSort {
    type Err = ChatlistError;

    fn from_str(name: &str) -> Result<Self, ChatlistError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "date" | "newest" => Ok(Self::Newest),
            "text" | "prompt" => Ok(Self::Text),
            "tags" => Ok(Self::Tags),
            other => Err(ChatlistError::InvalidCommand(format!(
                "unknown prompt order '{other}' (expected date, text or tags)"
            ))),
        }
    }
}

/// Which prompt fields a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    #[default]
    Everywhere,
    Text,
    Tags,
}

/// Newest first, or alphabetical (case-insensitive) by text or joined tags.
/// Untagged prompts sort after tagged ones.
pub fn sort_prompts(prompts: &mut [SavedPrompt], sort: PromptSort) {
    match sort {
        PromptSort::Newest => prompts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        }),
        PromptSort::Text => prompts.sort_by_cached_key(|p| p.text.to_lowercase()),
        PromptSort::Tags => {
            prompts.sort_by_cached_key(|p| (p.tags.is_empty(), p.tags.join(",").to_lowercase()))
        }
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Prompts whose text and/or tags contain `needle`, newest first.
pub fn search_prompts(
    prompts: &[SavedPrompt],
    needle: &str,
    scope: SearchScope,
) -> Vec<SavedPrompt> {
    let needle = needle.trim().to_lowercase();
    let mut found: Vec<_> = prompts
        .iter()
        .filter(|p| {
            let in_text = || contains_folded(&p.text, &needle);
            let in_tags = || p.tags.iter().any(|t| contains_folded(t, &needle));
            match scope {
                SearchScope::Everywhere => in_text() || in_tags(),
                SearchScope::Text => in_text(),
                SearchScope::Tags => in_tags(),
            }
        })
        .cloned()
        .collect();
    sort_prompts(&mut found, PromptSort::Newest);
    found
}

/// The saved prompt with exactly this text, newest first if there are
/// several.
pub fn find_exact<'a>(prompts: &'a [SavedPrompt], text: &str) -> Option<&'a SavedPrompt> {
    prompts
        .iter()
        .filter(|p| p.text == text)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

pub fn newest_results(mut records: Vec<PersistedResult>) -> Vec<PersistedResult> {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    records
}

/// Saved results whose response, prompt or provider name contains `needle`,
/// newest first.
pub fn search_results(records: Vec<PersistedResult>, needle: &str) -> Vec<PersistedResult> {
    let needle = needle.trim().to_lowercase();
    let found = records
        .into_iter()
        .filter(|r| {
            contains_folded(&r.response, &needle)
                || contains_folded(&r.prompt_text, &needle)
                || contains_folded(&r.provider_name, &needle)
        })
        .collect();
    newest_results(found)
}
