use thiserror::Error;

/// Whole-operation failures. Per-provider dispatch failures never surface
/// here; they are folded into each `ModelResult`.
#[derive(Debug, Error)]
pub enum ChatlistError {
    #[error("config load failed: {0}")]
    ConfigLoad(String),

    #[error("invalid config: {0}")]
    ConfigValidation(String),

    #[error("http client setup failed: {0}")]
    HttpClient(String),

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no active providers configured")]
    NoActiveProviders,

    #[error("no result at position {0}")]
    NoSuchResult(usize),

    /// A 1-based position into the latest prompt or history listing.
    #[error("no listed entry at position {0}")]
    NoSuchEntry(usize),

    #[error("nothing listed; run :prompts or :history first")]
    NothingListed,

    #[error("unknown provider id {0}")]
    UnknownProvider(u64),

    #[error("result store error: {0}")]
    Store(String),

    #[error("prompt improvement failed: {0}")]
    Improve(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
