use std::fmt::Write as _;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::ChatlistError;
use crate::results::ModelResult;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ChatlistError;

    fn from_str(name: &str) -> Result<Self, ChatlistError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ChatlistError::Export(format!("unknown export format '{other}'"))),
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    export_date: String,
    prompt: &'a str,
    results: Vec<JsonEntry<'a>>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    model_name: &'a str,
    response: &'a str,
    selected: bool,
}

/// Render `results` for saving to a file. `at` is stamped as the export date.
pub fn render(
    format: ExportFormat,
    prompt: &str,
    results: &[ModelResult],
    at: NaiveDateTime,
) -> Result<String, ChatlistError> {
    let date = at.format(DATE_FORMAT).to_string();
    match format {
        ExportFormat::Markdown => Ok(markdown(prompt, results, &date)),
        ExportFormat::Text => Ok(text(prompt, results, &date)),
        ExportFormat::Json => {
            let export = JsonExport {
                export_date: date,
                prompt,
                results: results
                    .iter()
                    .map(|r| JsonEntry {
                        model_name: &r.provider_display_name,
                        response: &r.response_text,
                        selected: r.selected,
                    })
                    .collect(),
            };
            serde_json::to_string_pretty(&export).map_err(|e| ChatlistError::Export(e.to_string()))
        }
    }
}

fn markdown(prompt: &str, results: &[ModelResult], date: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Model comparison\n");
    let _ = writeln!(out, "**Exported:** {date}\n");
    if !prompt.is_empty() {
        let _ = writeln!(out, "## Prompt\n\n{prompt}\n");
    }
    let _ = writeln!(out, "## Results\n");
    for (i, result) in results.iter().enumerate() {
        let _ = write!(out, "### {}. {}", i + 1, result.provider_display_name);
        if result.selected {
            out.push_str(" *(selected)*");
        }
        let _ = writeln!(out, "\n\n{}\n\n---\n", result.response_text);
    }
    out
}

fn text(prompt: &str, results: &[ModelResult], date: &str) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut lines = vec![
        heavy.clone(),
        "MODEL COMPARISON".to_owned(),
        heavy.clone(),
        format!("Exported: {date}"),
        String::new(),
    ];
    if !prompt.is_empty() {
        lines.extend([
            "PROMPT:".to_owned(),
            light.clone(),
            prompt.to_owned(),
            String::new(),
        ]);
    }
    lines.extend(["RESULTS:".to_owned(), heavy.clone(), String::new()]);
    for (i, result) in results.iter().enumerate() {
        let marker = if result.selected { " [SELECTED]" } else { "" };
        lines.extend([
            format!("{}. {}{marker}", i + 1, result.provider_display_name),
            light.clone(),
            result.response_text.clone(),
            String::new(),
            heavy.clone(),
            String::new(),
        ]);
    }
    lines.join("\n")
}
