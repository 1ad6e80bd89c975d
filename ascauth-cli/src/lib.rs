//! ascauth CLI
//!
//! The credential commands behind the `ascauth` binary. Each command lives
//! in [`commands`] as an `execute` function over a [`Context`] and an output
//! sink, so tests can drive them in-process.

use std::sync::Arc;

use ascauth_core::{
    Environment, InlineKeyCache, ResolveError, ResolveOptions, ResolvedIdentity, Resolver,
    SecretStore, Settings, StoreSelector, inline_key,
};

pub mod commands;
pub mod exit;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,

    /// A single JSON document on stdout.
    Json,
}

/// Per-process state shared by all commands.
pub struct Context {
    pub settings: Settings,
    pub env: Arc<dyn Environment>,
    pub selector: StoreSelector,
    pub cache: &'static InlineKeyCache,
    pub output: OutputFormat,
}

impl Context {
    /// Build a context over the OS keyring.
    pub fn new(settings: Settings, env: Arc<dyn Environment>, output: OutputFormat) -> Self {
        let selector = StoreSelector::new(settings.store_settings());
        Self {
            settings,
            env,
            selector,
            cache: inline_key::process_cache(),
            output,
        }
    }

    /// Use `secrets` instead of the OS keyring.
    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.selector = StoreSelector::new(self.settings.store_settings()).with_secret_store(secrets);
        self
    }

    /// Resolve the identity for this invocation.
    pub fn resolve(&self) -> Result<ResolvedIdentity, ResolveError> {
        let store = self.selector.select();
        let options = ResolveOptions {
            profile: self.settings.profile.clone(),
            strict: self.settings.strict,
        };
        Resolver::new(store.as_ref(), self.env.as_ref(), self.cache).resolve(&options)
    }

    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }
}
