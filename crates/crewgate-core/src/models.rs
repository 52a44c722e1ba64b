//! Model catalog: live inference-server tags followed by the static cloud list.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::inference::InferenceClient;

/// Cloud models offered when no list is configured.
pub const DEFAULT_CLOUD_MODELS: &[&str] = &[
    "gemini-2.5-pro-exp-03-25",
    "gemini-2.0-flash",
    "gemini-1.5-pro",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelEntry>,
}

/// Merge the live local list with `cloud_models`.
///
/// A failing inference server contributes nothing; the call itself never fails.
pub async fn list_models(client: &InferenceClient, cloud_models: &[String]) -> ModelList {
    let live = match client.list_tags().await {
        Ok(names) => {
            debug!(count = names.len(), "Fetched local models");
            names
        }
        Err(err) => {
            warn!(url = client.base_url(), error = %err, "Local model listing unavailable");
            Vec::new()
        }
    };

    let models = live
        .into_iter()
        .map(|name| ModelEntry {
            name,
            backend: Backend::LocalInference,
        })
        .chain(cloud_models.iter().map(|name| ModelEntry {
            name: name.clone(),
            backend: Backend::CloudGenerative,
        }))
        .collect();

    ModelList { models }
}
