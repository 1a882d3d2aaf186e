use std::sync::Arc;

use taodiv_core::Settings;
use taodiv_infra::{
    ChainOrchestrator, DividendGateway, OrchestratorConfig, RevocationManager, RevocationPolicy,
    SimulatedDividendSource,
    cache::{CacheError, CacheStore, InMemoryCacheStore},
    jobs::{InMemoryJobQueue, JobQueue, JobSpecError},
    stages::{PipelineDeps, register_pipeline},
};

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("invalid stage limits: {0}")]
    InvalidLimits(#[from] JobSpecError),
    #[error("cache backend unavailable: {0}")]
    Cache(#[from] CacheError),
}

/// Collaborators shared by every request, built once at startup.
pub struct AppServices {
    pub settings: Arc<Settings>,
    pub gateway: DividendGateway,
    pub orchestrator: ChainOrchestrator,
    pub queue: Arc<dyn JobQueue>,
}

pub fn build_services(settings: Arc<Settings>) -> Result<AppServices, ServicesError> {
    build_services_with(settings, PipelineDeps::simulated())
}

/// Like `build_services`, with caller-supplied stage collaborators.
pub fn build_services_with(
    settings: Arc<Settings>,
    pipeline: PipelineDeps,
) -> Result<AppServices, ServicesError> {
    let cache = build_cache(&settings)?;
    let source = Arc::new(SimulatedDividendSource::new(settings.query_delay));
    let gateway = DividendGateway::new(cache, source, settings.clone());

    let in_memory = Arc::new(InMemoryJobQueue::with_retention(settings.job_result_retention));
    register_pipeline(&in_memory, pipeline);
    let queue: Arc<dyn JobQueue> = in_memory;

    let lifecycle = RevocationManager::new(queue.clone(), RevocationPolicy::from_settings(&settings));
    let orchestrator = ChainOrchestrator::new(
        queue.clone(),
        lifecycle,
        OrchestratorConfig::from_settings(&settings)?,
    );

    Ok(AppServices {
        settings,
        gateway,
        orchestrator,
        queue,
    })
}

#[cfg(feature = "redis")]
fn build_cache(settings: &Settings) -> Result<Arc<dyn CacheStore>, ServicesError> {
    if settings.use_redis_cache {
        tracing::info!(url = %settings.redis_url, "using Redis cache store");
        let store = taodiv_infra::cache::RedisCacheStore::new(&settings.redis_url)?;
        return Ok(Arc::new(store));
    }
    Ok(InMemoryCacheStore::arc())
}

#[cfg(not(feature = "redis"))]
fn build_cache(settings: &Settings) -> Result<Arc<dyn CacheStore>, ServicesError> {
    if settings.use_redis_cache {
        tracing::warn!("USE_REDIS_CACHE set but built without the `redis` feature; using in-memory cache");
    }
    Ok(InMemoryCacheStore::arc())
}
