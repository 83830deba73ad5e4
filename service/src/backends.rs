//! Lazily initialised shared handles for the document store and the text
//! generator.
//!
//! Each handle is built from config on first use and then shared
//! read-only by every request.

use std::sync::Arc;

use snsdiag_openai::{OpenAiClient, OpenAiConfig};
use snsdiag_store::{DocumentStore, MemoryStore, SqliteStore};
use tokio::sync::OnceCell;

use crate::config::{ServiceConfig, StoreBackend};
use crate::errors::Result;
use crate::strategy::{OpenAiGenerator, TextGenerator};

pub struct Backends {
    config: ServiceConfig,
    store: OnceCell<Arc<dyn DocumentStore>>,
    generator: OnceCell<Arc<dyn TextGenerator>>,
}

impl Backends {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
            generator: OnceCell::new(),
        }
    }

    /// Use ready-made handles instead of building them from config.
    pub fn with_handles(
        config: ServiceConfig,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            store: OnceCell::new_with(Some(store)),
            generator: OnceCell::new_with(Some(generator)),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store
            .get_or_try_init(|| async { open_store(&self.config) })
            .await
            .cloned()
    }

    pub async fn generator(&self) -> Result<Arc<dyn TextGenerator>> {
        self.generator
            .get_or_try_init(|| async { build_generator(&self.config) })
            .await
            .cloned()
    }
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.store.resolved_path();
            let store = SqliteStore::open(&path)?;
            tracing::info!(path = %path.display(), "using sqlite document store");
            Ok(Arc::new(store))
        }
    }
}

fn build_generator(config: &ServiceConfig) -> Result<Arc<dyn TextGenerator>> {
    let generation = &config.generation;
    let api_key = generation.resolve_api_key()?;
    let mut client_config = OpenAiConfig::new(api_key).with_base_url(&generation.base_url);
    if let Some(org) = &generation.organization {
        client_config = client_config.with_organization(org);
    }
    let client = OpenAiClient::new(&client_config)?;
    tracing::info!(model = %generation.model, "text generator ready");
    Ok(Arc::new(OpenAiGenerator::new(client, generation)))
}
