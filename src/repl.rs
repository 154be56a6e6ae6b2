use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config;
use crate::error::ChatlistError;
use crate::export::ExportFormat;
use crate::improve::{Adaptation, Improvement};
use crate::library::{PromptSort, SavedPrompt, SearchScope};
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::results::ResultSet;
use crate::store::PersistedResult;

const PREVIEW_CHARS: usize = 100;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

pub const HELP: &str = "\
Type a prompt to send it to every active provider.
Commands (positions are 1-based):
  :show N              print result N in full
  :select N            toggle selection of result N
  :save                persist selected results
  :export [FORMAT] PATH  write results as markdown, json or text
  :list                show the latest results
  :keep [TAGS]         add the latest prompt to the library, tags comma-separated
  :prompts [ORDER]     list saved prompts by date, text or tags
  :search [text|tags] WORDS  search saved prompts
  :history [WORDS]     list saved results, optionally filtered
  :use N               send listed prompt N again
  :view N              print listed entry N in full
  :delete N            delete listed entry N
  :improve [@ID] [TEXT]  suggest better wording for TEXT or the latest prompt
  :adapt KIND [@ID] [TEXT]  rewrite for technical, analytical or creative work
  :providers           show configured providers
  :enable ID / :disable ID  switch a provider on or off
  :remove ID           delete a provider
  :provider { ... }    add or replace a provider (TOML inline table)
  :help                this message
  :quit                exit

Provider changes are written back to the config file.";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Show(usize),
    Select(usize),
    Save,
    Export {
        format: Option<ExportFormat>,
        path: PathBuf,
    },
    List,
    Keep {
        tags: String,
    },
    Prompts(PromptSort),
    Search {
        scope: SearchScope,
        needle: String,
    },
    History(Option<String>),
    Use(usize),
    View(usize),
    Delete(usize),
    Improve {
        provider: Option<u64>,
        text: Option<String>,
    },
    Adapt {
        adaptation: Adaptation,
        provider: Option<u64>,
        text: Option<String>,
    },
    Providers,
    Enable(u64),
    Disable(u64),
    Remove(u64),
    Provider(ProviderConfig),
    Help,
    Quit,
}

impl Command {
    /// Lines starting with `:` are commands; anything else is a prompt.
    /// Positions are converted from 1-based to 0-based.
    pub fn parse(line: &str) -> Result<Self, ChatlistError> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Self::Send(line.to_owned()));
        };
        let (name, tail) = match rest.trim_start().split_once(char::is_whitespace) {
            Some((name, tail)) => (name, tail.trim()),
            None => (rest.trim(), ""),
        };

        // Commands that take free text.
        match name {
            "keep" => {
                return Ok(Self::Keep {
                    tags: tail.to_owned(),
                });
            }
            "search" => return search(tail),
            "history" => return Ok(Self::History(free_text(tail))),
            "improve" => {
                let (provider, text) = provider_and_text(tail)?;
                return Ok(Self::Improve { provider, text });
            }
            "adapt" => {
                let (kind, tail) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
                if kind.is_empty() {
                    return Err(ChatlistError::InvalidCommand(
                        "usage: :adapt technical|analytical|creative [@ID] [TEXT]".to_owned(),
                    ));
                }
                let (provider, text) = provider_and_text(tail.trim())?;
                return Ok(Self::Adapt {
                    adaptation: kind.parse()?,
                    provider,
                    text,
                });
            }
            "provider" => return Ok(Self::Provider(config::parse_provider(tail)?)),
            _ => {}
        }

        let args: Vec<&str> = tail.split_whitespace().collect();
        match (name, args.as_slice()) {
            ("show", [n]) => Ok(Self::Show(position(n)?)),
            ("select", [n]) => Ok(Self::Select(position(n)?)),
            ("save", []) => Ok(Self::Save),
            ("export", [path]) => Ok(Self::Export {
                format: None,
                path: PathBuf::from(path),
            }),
            ("export", [format, path]) => Ok(Self::Export {
                format: Some(format.parse()?),
                path: PathBuf::from(path),
            }),
            ("list", []) => Ok(Self::List),
            ("prompts", []) => Ok(Self::Prompts(PromptSort::default())),
            ("prompts", [order]) => Ok(Self::Prompts(order.parse()?)),
            ("use", [n]) => Ok(Self::Use(position(n)?)),
            ("view", [n]) => Ok(Self::View(position(n)?)),
            ("delete", [n]) => Ok(Self::Delete(position(n)?)),
            ("providers", []) => Ok(Self::Providers),
            ("enable", [id]) => Ok(Self::Enable(provider_id(id)?)),
            ("disable", [id]) => Ok(Self::Disable(provider_id(id)?)),
            ("remove", [id]) => Ok(Self::Remove(provider_id(id)?)),
            ("help", []) => Ok(Self::Help),
            ("quit" | "q" | "exit", []) => Ok(Self::Quit),
            _ => Err(ChatlistError::InvalidCommand(line.to_owned())),
        }
    }
}

fn free_text(tail: &str) -> Option<String> {
    (!tail.is_empty()).then(|| tail.to_owned())
}

fn search(tail: &str) -> Result<Command, ChatlistError> {
    let (scope, needle) = match tail.split_once(char::is_whitespace) {
        Some(("text", needle)) => (SearchScope::Text, needle.trim()),
        Some(("tags", needle)) => (SearchScope::Tags, needle.trim()),
        _ => (SearchScope::Everywhere, tail),
    };
    if needle.is_empty() {
        return Err(ChatlistError::InvalidCommand(
            "usage: :search [text|tags] WORDS".to_owned(),
        ));
    }
    Ok(Command::Search {
        scope,
        needle: needle.to_owned(),
    })
}

/// An optional leading `@ID` picks the provider; the rest is the text.
fn provider_and_text(tail: &str) -> Result<(Option<u64>, Option<String>), ChatlistError> {
    let Some(tagged) = tail.strip_prefix('@') else {
        return Ok((None, free_text(tail)));
    };
    let (id, text) = tagged.split_once(char::is_whitespace).unwrap_or((tagged, ""));
    Ok((Some(provider_id(id)?), free_text(text.trim())))
}

fn provider_id(raw: &str) -> Result<u64, ChatlistError> {
    raw.parse().map_err(|_| {
        ChatlistError::InvalidCommand(format!("'{raw}' is not a provider id"))
    })
}

fn position(raw: &str) -> Result<usize, ChatlistError> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ChatlistError::InvalidCommand(format!(
            "'{raw}' is not a result position"
        ))),
    }
}

/// Compact table: one line per result with a selection box and the first
/// line of the response.
pub fn render_results(results: &ResultSet) -> String {
    if results.is_empty() {
        return "no results yet".to_owned();
    }
    let width = results
        .as_slice()
        .iter()
        .map(|r| r.provider_display_name.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (i, result) in results.as_slice().iter().enumerate() {
        let mark = if result.selected { "x" } else { " " };
        let _ = writeln!(
            out,
            "[{mark}] {:>2}. {:<width$}  {}",
            i + 1,
            result.provider_display_name,
            preview(&result.response_text),
        );
    }
    out
}

fn preview(text: &str) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut chars = first.trim().chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    let more = chars.next().is_some() || text.trim().lines().count() > 1;
    if more { format!("{head} …") } else { head }
}

pub fn render_providers(registry: &ProviderRegistry) -> String {
    let mut out = String::new();
    for p in registry.all() {
        let state = if p.active { "active" } else { "inactive" };
        let _ = writeln!(
            out,
            "{:>3}  {:<8}  {} ({}, {}) -> {}",
            p.id, state, p.display_name, p.kind, p.upstream_model_id, p.endpoint_url
        );
    }
    if out.is_empty() {
        out.push_str("no providers configured\n");
    }
    out
}

pub fn render_prompts(prompts: &[SavedPrompt]) -> String {
    if prompts.is_empty() {
        return "no saved prompts\n".to_owned();
    }
    let mut out = String::new();
    for (i, prompt) in prompts.iter().enumerate() {
        let tags = if prompt.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", prompt.tags.join(", "))
        };
        let _ = writeln!(
            out,
            "{:>2}. {}{tags}  {}",
            i + 1,
            prompt.created_at.format(DATE_FORMAT),
            preview(&prompt.text),
        );
    }
    out
}

pub fn render_history(records: &[PersistedResult]) -> String {
    if records.is_empty() {
        return "no saved results\n".to_owned();
    }
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {}  {}: {}\n      {}",
            i + 1,
            record.created_at.format(DATE_FORMAT),
            record.provider_name,
            preview(&record.prompt_text),
            preview(&record.response),
        );
    }
    out
}

pub fn render_prompt(prompt: &SavedPrompt) -> String {
    let mut out = format!("== prompt saved {} ==\n", prompt.created_at.format(DATE_FORMAT));
    if !prompt.tags.is_empty() {
        let _ = writeln!(out, "tags: {}", prompt.tags.join(", "));
    }
    out.push_str(&prompt.text);
    out
}

pub fn render_record(record: &PersistedResult) -> String {
    format!(
        "== {} ({}) ==\nprompt: {}\n\n{}",
        record.provider_name,
        record.created_at.format(DATE_FORMAT),
        record.prompt_text,
        record.response,
    )
}

pub fn render_improvement(improvement: &Improvement) -> String {
    let mut out = format!(
        "== suggestions from {} ==\nimproved:\n  {}\n",
        improvement.provider, improvement.improved
    );
    if !improvement.alternatives.is_empty() {
        out.push_str("alternatives:\n");
        for (i, alternative) in improvement.alternatives.iter().enumerate() {
            let _ = writeln!(out, "  {}. {alternative}", i + 1);
        }
    }
    for (label, text) in [
        ("technical", &improvement.technical),
        ("analytical", &improvement.analytical),
        ("creative", &improvement.creative),
    ] {
        if let Some(text) = text {
            let _ = writeln!(out, "{label}:\n  {text}");
        }
    }
    out
}
