use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::ChatlistError;
use crate::improve::{self, Adaptation, Improvement};
use crate::library::{self, PromptSort, SavedPrompt, SearchScope};
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::results::ResultSet;
use crate::store::{MemoryStore, PersistedResult, RecordStore};

/// What the last `:prompts`, `:search` or `:history` showed. Positions given
/// to `:use`, `:view` and `:delete` index into this.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Listing {
    #[default]
    Empty,
    Prompts(Vec<SavedPrompt>),
    History(Vec<PersistedResult>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Prompts(prompts) => prompts.len(),
            Self::History(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host-side state between prompts: the registry, the engine, the results
/// of the latest dispatch, and the prompt and result stores.
pub struct Session {
    registry: ProviderRegistry,
    dispatcher: Dispatcher,
    results: ResultSet,
    result_store: Box<dyn RecordStore<PersistedResult>>,
    prompt_store: Box<dyn RecordStore<SavedPrompt>>,
    listing: Listing,
}

impl Session {
    /// A session backed by in-memory stores; see [`Session::with_stores`].
    pub fn new(registry: ProviderRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            results: ResultSet::default(),
            result_store: Box::new(MemoryStore::<PersistedResult>::new()),
            prompt_store: Box::new(MemoryStore::<SavedPrompt>::new()),
            listing: Listing::Empty,
        }
    }

    pub fn with_stores(
        mut self,
        result_store: Box<dyn RecordStore<PersistedResult>>,
        prompt_store: Box<dyn RecordStore<SavedPrompt>>,
    ) -> Self {
        self.result_store = result_store;
        self.prompt_store = prompt_store;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ResultSet {
        &mut self.results
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    /// Dispatch `prompt` to every active provider, replacing the previous
    /// results. Having no active providers is an error; every provider
    /// failing is not.
    pub async fn send(&mut self, prompt: &str) -> Result<&ResultSet, ChatlistError> {
        if prompt.trim().is_empty() {
            return Err(ChatlistError::EmptyPrompt);
        }
        let providers = self.registry.list_active();
        if providers.is_empty() {
            return Err(ChatlistError::NoActiveProviders);
        }

        let results = self.dispatcher.dispatch(prompt, &providers).await;
        self.results = ResultSet::new(prompt, results);
        tracing::info!(
            results = self.results.len(),
            errors = self.results.error_count(),
            "dispatch complete"
        );
        Ok(&self.results)
    }

    /// Write every selected result to the result store, attributing each to
    /// its provider by display name and to the saved prompt with the same
    /// text (saving the prompt untagged if the library lacks it). Returns
    /// how many were saved.
    pub fn persist_selected(&mut self) -> Result<usize, ChatlistError> {
        if self.results.selected().next().is_none() {
            return Ok(0);
        }
        let prompt = self.results.prompt().to_owned();
        let prompt_id = self.library_prompt_for(&prompt)?;

        let mut saved = 0;
        for result in self.results.selected() {
            let provider_id = self.registry.provider_id_for(&result.provider_display_name);
            if provider_id.is_none() {
                tracing::warn!(
                    provider = %result.provider_display_name,
                    "no provider matches this display name; saving without id"
                );
            }
            let record = PersistedResult::new(
                Some(prompt_id),
                provider_id,
                &result.provider_display_name,
                &prompt,
                &result.response_text,
            );
            self.result_store.save(&record)?;
            saved += 1;
        }
        Ok(saved)
    }

    fn library_prompt_for(&mut self, text: &str) -> Result<Uuid, ChatlistError> {
        let prompts = self.prompt_store.load_all()?;
        if let Some(existing) = library::find_exact(&prompts, text) {
            return Ok(existing.id);
        }
        let prompt = SavedPrompt::new(text, Vec::new());
        self.prompt_store.save(&prompt)?;
        Ok(prompt.id)
    }

    /// Add `text` (or, when `None`, the latest dispatched prompt) to the
    /// prompt library with the given comma-separated tags.
    pub fn save_prompt(
        &mut self,
        text: Option<&str>,
        tags: &str,
    ) -> Result<SavedPrompt, ChatlistError> {
        let text = text.unwrap_or(self.results.prompt()).trim();
        if text.is_empty() {
            return Err(ChatlistError::EmptyPrompt);
        }
        let prompt = SavedPrompt::new(text, library::parse_tags(tags));
        self.prompt_store.save(&prompt)?;
        tracing::info!(id = %prompt.id, tags = prompt.tags.len(), "prompt saved");
        Ok(prompt)
    }

    pub fn list_prompts(&mut self, sort: PromptSort) -> Result<&[SavedPrompt], ChatlistError> {
        let mut prompts = self.prompt_store.load_all()?;
        library::sort_prompts(&mut prompts, sort);
        Ok(self.show_prompts(prompts))
    }

    pub fn find_prompts(
        &mut self,
        needle: &str,
        scope: SearchScope,
    ) -> Result<&[SavedPrompt], ChatlistError> {
        let prompts = self.prompt_store.load_all()?;
        let found = library::search_prompts(&prompts, needle, scope);
        Ok(self.show_prompts(found))
    }

    fn show_prompts(&mut self, prompts: Vec<SavedPrompt>) -> &[SavedPrompt] {
        self.listing = Listing::Prompts(prompts);
        match &self.listing {
            Listing::Prompts(prompts) => prompts.as_slice(),
            _ => &[],
        }
    }

    /// Saved results, newest first; only those matching `needle` if given.
    pub fn history(&mut self, needle: Option<&str>) -> Result<&[PersistedResult], ChatlistError> {
        let records = self.result_store.load_all()?;
        let records = match needle {
            Some(needle) => library::search_results(records, needle),
            None => library::newest_results(records),
        };
        self.listing = Listing::History(records);
        match &self.listing {
            Listing::History(records) => Ok(records.as_slice()),
            _ => Ok(&[]),
        }
    }

    /// Prompt at 0-based `index` of the current listing.
    pub fn listed_prompt(&self, index: usize) -> Result<&SavedPrompt, ChatlistError> {
        match &self.listing {
            Listing::Prompts(prompts) => prompts
                .get(index)
                .ok_or(ChatlistError::NoSuchEntry(index + 1)),
            Listing::History(_) => Err(ChatlistError::InvalidCommand(
                "the current listing is history, not prompts".to_owned(),
            )),
            Listing::Empty => Err(ChatlistError::NothingListed),
        }
    }

    /// Re-send a listed library prompt to every active provider.
    pub async fn send_listed(&mut self, index: usize) -> Result<&ResultSet, ChatlistError> {
        let text = self.listed_prompt(index)?.text.clone();
        self.send(&text).await
    }

    /// Delete the entry at 0-based `index` of the current listing from its
    /// store and from the listing. Later positions shift down by one.
    pub fn delete_listed(&mut self, index: usize) -> Result<(), ChatlistError> {
        if index >= self.listing.len() {
            return Err(match self.listing {
                Listing::Empty => ChatlistError::NothingListed,
                _ => ChatlistError::NoSuchEntry(index + 1),
            });
        }
        let found = match &mut self.listing {
            Listing::Prompts(prompts) => {
                let id = prompts[index].id;
                let found = self.prompt_store.delete(id)?;
                prompts.remove(index);
                found
            }
            Listing::History(records) => {
                let id = records[index].id;
                let found = self.result_store.delete(id)?;
                records.remove(index);
                found
            }
            Listing::Empty => false,
        };
        if !found {
            tracing::warn!(position = index + 1, "entry was already gone from its store");
        }
        Ok(())
    }

    /// Ask one provider to improve `text`: the one with `provider_id`, else
    /// the first active provider.
    pub async fn improve(
        &self,
        text: &str,
        provider_id: Option<u64>,
    ) -> Result<Improvement, ChatlistError> {
        let (provider, reply) = self
            .ask_one(&improve::improvement_prompt(text.trim()), text, provider_id)
            .await?;
        Ok(improve::parse_improvement(&provider, &reply))
    }

    /// Rewrite `text` for a kind of task; returns the model's rewrite.
    pub async fn adapt(
        &self,
        text: &str,
        adaptation: Adaptation,
        provider_id: Option<u64>,
    ) -> Result<String, ChatlistError> {
        let (_, reply) = self
            .ask_one(&adaptation.prompt(text.trim()), text, provider_id)
            .await?;
        Ok(reply.trim().to_owned())
    }

    async fn ask_one(
        &self,
        meta_prompt: &str,
        original: &str,
        provider_id: Option<u64>,
    ) -> Result<(String, String), ChatlistError> {
        if original.trim().is_empty() {
            return Err(ChatlistError::EmptyPrompt);
        }
        let provider = self.improver(provider_id)?;
        tracing::debug!(provider = %provider.display_name, "asking for a prompt rewrite");

        let mut results = self
            .dispatcher
            .dispatch(meta_prompt, std::slice::from_ref(&provider))
            .await;
        let Some(result) = results.pop() else {
            return Err(ChatlistError::Improve("no result returned".to_owned()));
        };
        if result.is_error() {
            return Err(ChatlistError::Improve(format!(
                "{}: {}",
                result.provider_display_name, result.response_text
            )));
        }
        Ok((result.provider_display_name, result.response_text))
    }

    fn improver(&self, provider_id: Option<u64>) -> Result<ProviderConfig, ChatlistError> {
        match provider_id {
            Some(id) => self
                .registry
                .get(id)
                .cloned()
                .ok_or(ChatlistError::UnknownProvider(id)),
            None => self
                .registry
                .list_active()
                .into_iter()
                .next()
                .ok_or(ChatlistError::NoActiveProviders),
        }
    }
}
