pub mod backend;
pub mod config;
pub mod env_file;
pub mod error;
pub mod inference;
pub mod models;
pub mod process;
pub mod report;
pub mod research;

pub use backend::{Backend, BackendDescriptor, BackendRegistry};
pub use config::CrewgateConfig;

use std::sync::Arc;

use inference::InferenceClient;
use research::ResearchService;
use tracing::info;

/// Core application state shared by the HTTP handlers.
pub struct AppCore {
    pub config: CrewgateConfig,
    pub registry: Arc<BackendRegistry>,
    pub inference: InferenceClient,
    pub research: ResearchService,
}

impl AppCore {
    pub fn new(config: CrewgateConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(config.registry());
        let inference = InferenceClient::new(config.inference.url.clone())
            .with_chat_timeout(config.inference.chat_timeout)
            .with_tags_timeout(config.inference.models_timeout);
        let research = ResearchService::new(registry.clone(), config.research.clone())?;

        for descriptor in registry.iter() {
            info!(
                backend = %descriptor.backend,
                project_dir = %descriptor.project_dir.display(),
                env_file = %descriptor.env_file.display(),
                "Backend registered"
            );
        }
        info!(inference_url = %inference.base_url(), "Initializing Crewgate");

        Ok(Self {
            config,
            registry,
            inference,
            research,
        })
    }
}
