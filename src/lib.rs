//! Broadcast one prompt to several chat-completion endpoints and compare the
//! answers.
//!
//! The [`dispatch`] module is the core: it fans a prompt out to every active
//! provider concurrently and folds every outcome, success or failure, into a
//! [`results::ModelResult`]. The rest is the plumbing around it: provider
//! registry and credentials, settings, the prompt library and result
//! history, prompt improvement, export, and the REPL front end.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod improve;
pub mod library;
pub mod providers;
pub mod registry;
pub mod repl;
pub mod results;
pub mod session;
pub mod settings;
pub mod store;

pub use dispatch::{DispatchFailure, DispatchRequest, Dispatcher, EngineContext};
pub use error::ChatlistError;
pub use library::SavedPrompt;
pub use registry::{ProviderConfig, ProviderRegistry};
pub use results::{ERROR_MARKER, ModelResult, ResultSet, ResultStatus};
