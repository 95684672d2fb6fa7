//! Application lifecycle: wires the cache core to config, builds the
//! provider chain, and drives startup/shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::audio_store::AudioStore;
use crate::cache::Cache;
use crate::config::CacheVoiceConfig;
use crate::db::MetadataDb;
use crate::pipeline::RequestPipeline;
use crate::provider::fallback::ProviderFallback;
use crate::provider::mock::MockTtsProvider;
use crate::provider::http::HttpTtsProvider;
use crate::provider::{has_credentials, TtsProvider};
use crate::config::parse_duration;
use crate::server::{build_router, AppState};
use crate::{evictor, fillers, reconciler};

const FALLBACK_EVICTION_INTERVAL: Duration = Duration::from_secs(3600);
const FALLBACK_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns every long-lived collaborator and the background task handles that
/// must be stopped at shutdown.
pub struct App {
    pub config: CacheVoiceConfig,
    pub cache: Arc<Cache>,
    pub pipeline: Arc<RequestPipeline>,
    providers: Arc<ProviderFallback>,
    evictor_handle: Option<tokio::task::JoinHandle<()>>,
}

impl App {
    /// Build every collaborator from configuration. Does not start the
    /// background evictor or bind the HTTP listener — call [`App::serve`]
    /// for that.
    pub fn init(config: CacheVoiceConfig) -> anyhow::Result<Self> {
        let audio_store = AudioStore::new(&config.server.data_dir);
        audio_store.ensure_dirs()?;

        let db_path = config.server.data_dir.join("cache.sqlite3");
        let db = MetadataDb::open(&db_path)?;

        let cache = Arc::new(Cache::new(
            db,
            audio_store,
            config.normalize.clone(),
            config.fuzzy.clone(),
            config.cache.variety_depth,
        )?);

        let providers = Arc::new(build_provider_chain(&config));

        let pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&cache),
            Arc::clone(&providers),
            config.cache.max_text_length,
            config.cache.enabled,
            config.cache.variety_depth,
        ));

        Ok(Self {
            config,
            cache,
            pipeline,
            providers,
            evictor_handle: None,
        })
    }

    /// Run the startup Reconciler pass, optionally generate fillers, start
    /// the Evictor timer, and serve HTTP until the process is signaled to
    /// stop.
    pub async fn serve(&mut self) -> anyhow::Result<()> {
        let report = reconciler::run(&self.cache)?;
        info!(
            orphan_db_entries = report.orphan_db_entries,
            orphan_files = report.orphan_files,
            "reconciliation complete"
        );

        if self.config.fillers.auto_generate_on_startup {
            match fillers::generate_on_startup(
                &self.cache.audio_store,
                &self.providers,
                &self.config.fillers.voice_id,
            )
            .await
            {
                Ok(n) => info!(count = n, "filler generation complete"),
                Err(e) => warn!(error = %e, "filler generation failed"),
            }
        }

        let eviction_interval = parse_duration(&self.config.cache.eviction_interval)
            .unwrap_or_else(|e| {
                warn!(error = %e, "invalid cache.eviction_interval, using 1h default");
                FALLBACK_EVICTION_INTERVAL
            });

        self.evictor_handle = Some(evictor::spawn(
            Arc::clone(&self.cache),
            self.config.cache.max_entries,
            self.config.cache.min_age_days,
            eviction_interval,
        ));

        let state = Arc::new(AppState::new(Arc::clone(&self.pipeline)));
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind(&self.config.server.bind_addr).await?;
        info!(addr = %self.config.server.bind_addr, "cachevoice listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.shutdown();
        Ok(())
    }

    /// Stop the Evictor timer. In-flight pipeline warm-ups are abandoned,
    /// not awaited: the store is idempotent under retry.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.evictor_handle.take() {
            handle.abort();
        }
    }
}

fn build_provider_chain(config: &CacheVoiceConfig) -> ProviderFallback {
    let mut providers: Vec<(Arc<dyn TtsProvider>, Duration)> = Vec::new();

    for name in &config.providers.fallback_chain {
        if name == "mock" {
            providers.push((Arc::new(MockTtsProvider::new(name.clone())), FALLBACK_PROVIDER_TIMEOUT));
            continue;
        }

        match config.providers.configs.get(name) {
            Some(provider_config) if has_credentials(provider_config.api_key.as_deref()) => {
                let timeout = provider_config
                    .timeout_s
                    .map(Duration::from_secs)
                    .unwrap_or(FALLBACK_PROVIDER_TIMEOUT);
                providers.push((
                    Arc::new(HttpTtsProvider::new(name.clone(), provider_config.clone())),
                    timeout,
                ));
            }
            Some(_) => {
                warn!(provider = name, "skipping provider: no credentials configured");
            }
            None => {
                warn!(provider = name, "skipping provider: not present in providers.configs");
            }
        }
    }

    ProviderFallback::new(providers)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
