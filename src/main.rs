use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use chatlist::config::{self, Config, DEFAULT_CONFIG_PATH};
use chatlist::export::{self, ExportFormat};
use chatlist::registry::EnvCredentials;
use chatlist::repl::{self, Command, HELP};
use chatlist::session::{Listing, Session};
use chatlist::settings::{Settings, SettingsReader};
use chatlist::store::{JsonlStore, PersistedResult};
use chatlist::{ChatlistError, Dispatcher, EngineContext, SavedPrompt};

/// Write provider changes back to the config file and show the new list.
fn save_providers(
    path: &Path,
    settings: &Settings,
    session: &Session,
) -> Result<(), ChatlistError> {
    config::save(path, settings, session.registry())?;
    print!("{}", repl::render_providers(session.registry()));
    Ok(())
}

fn render_listing(listing: &Listing) -> String {
    match listing {
        Listing::Prompts(prompts) => repl::render_prompts(prompts),
        Listing::History(records) => repl::render_history(records),
        Listing::Empty => String::new(),
    }
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CHATLIST_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config =
        Config::load(&path).with_context(|| format!("loading config {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.settings.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Arc::new(config.settings);
    let credentials = Arc::new(EnvCredentials::with_dotenv());
    let dispatcher = Dispatcher::new(EngineContext::new(settings.clone(), credentials))?;
    let mut session = Session::new(config.registry, dispatcher).with_stores(
        Box::new(JsonlStore::<PersistedResult>::new(settings.store_path())),
        Box::new(JsonlStore::<SavedPrompt>::new(settings.prompts_path())),
    );
    let default_format: ExportFormat = settings.export_format().parse().unwrap_or_else(|e| {
        tracing::warn!("{e}; exporting as markdown");
        ExportFormat::Markdown
    });

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let mut editor = DefaultEditor::new()?;
    println!(
        "chatlist: {} active provider(s). Type :help for commands.",
        session.registry().list_active().len()
    );

    loop {
        let line = match editor.readline("chatlist> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let outcome = match command {
            Command::Quit => break,
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Providers => {
                print!("{}", repl::render_providers(session.registry()));
                Ok(())
            }
            Command::List => {
                print!("{}", repl::render_results(session.results()));
                Ok(())
            }
            Command::Send(prompt) => runtime
                .block_on(session.send(&prompt))
                .map(|results| print!("{}", repl::render_results(results))),
            Command::Show(index) => match session.results().get(index) {
                Some(result) => {
                    println!("== {} ==\n{}", result.provider_display_name, result.response_text);
                    Ok(())
                }
                None => Err(ChatlistError::NoSuchResult(index + 1)),
            },
            Command::Select(index) => session
                .results_mut()
                .toggle(index)
                .map_err(|_| ChatlistError::NoSuchResult(index + 1))
                .map(|_| print!("{}", repl::render_results(session.results()))),
            Command::Save => session
                .persist_selected()
                .map(|n| println!("saved {n} result(s) to {}", settings.store_path())),
            Command::Export { format, path } => {
                let format = format.unwrap_or(default_format);
                let results = session.results();
                export::render(
                    format,
                    results.prompt(),
                    results.as_slice(),
                    chrono::Local::now().naive_local(),
                )
                .and_then(|text| {
                    std::fs::write(&path, text).map_err(|e| {
                        ChatlistError::Export(format!("{}: {e}", path.display()))
                    })
                })
                .map(|()| println!("exported {} result(s) to {}", results.len(), path.display()))
            }
            Command::Keep { tags } => session.save_prompt(None, &tags).map(|prompt| {
                println!(
                    "prompt saved to {} with {} tag(s)",
                    settings.prompts_path(),
                    prompt.tags.len()
                )
            }),
            Command::Prompts(sort) => session
                .list_prompts(sort)
                .map(|prompts| print!("{}", repl::render_prompts(prompts))),
            Command::Search { scope, needle } => session
                .find_prompts(&needle, scope)
                .map(|prompts| print!("{}", repl::render_prompts(prompts))),
            Command::History(needle) => session
                .history(needle.as_deref())
                .map(|records| print!("{}", repl::render_history(records))),
            Command::Use(index) => runtime
                .block_on(session.send_listed(index))
                .map(|results| print!("{}", repl::render_results(results))),
            Command::View(index) => match session.listing() {
                Listing::Prompts(prompts) => prompts
                    .get(index)
                    .map(|prompt| println!("{}", repl::render_prompt(prompt)))
                    .ok_or(ChatlistError::NoSuchEntry(index + 1)),
                Listing::History(records) => records
                    .get(index)
                    .map(|record| println!("{}", repl::render_record(record)))
                    .ok_or(ChatlistError::NoSuchEntry(index + 1)),
                Listing::Empty => Err(ChatlistError::NothingListed),
            },
            Command::Delete(index) => session
                .delete_listed(index)
                .map(|()| print!("{}", render_listing(session.listing()))),
            Command::Improve { provider, text } => {
                let text = text.unwrap_or_else(|| session.results().prompt().to_owned());
                runtime
                    .block_on(session.improve(&text, provider))
                    .map(|improvement| print!("{}", repl::render_improvement(&improvement)))
            }
            Command::Adapt {
                adaptation,
                provider,
                text,
            } => {
                let text = text.unwrap_or_else(|| session.results().prompt().to_owned());
                runtime
                    .block_on(session.adapt(&text, adaptation, provider))
                    .map(|rewrite| println!("{rewrite}"))
            }
            Command::Enable(id) => session
                .registry_mut()
                .set_active(id, true)
                .and_then(|()| save_providers(&path, &settings, &session)),
            Command::Disable(id) => session
                .registry_mut()
                .set_active(id, false)
                .and_then(|()| save_providers(&path, &settings, &session)),
            Command::Remove(id) => session
                .registry_mut()
                .remove(id)
                .and_then(|_| save_providers(&path, &settings, &session)),
            Command::Provider(provider) => session
                .registry_mut()
                .upsert(provider)
                .and_then(|()| save_providers(&path, &settings, &session)),
        };

        if let Err(e) = outcome {
            eprintln!("{e}");
        }
    }

    Ok(())
}
