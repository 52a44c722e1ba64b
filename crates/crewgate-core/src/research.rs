//! Research runs: rewrite the backend env file, run the orchestration tool,
//! collect its report.
//!
//! A request moves through `Received → BackendResolved → ConfigUpdated →
//! ProcessRan → ReportExtracted → Responded`. Any stage may end the request
//! early; the failure lands in [`ResearchResponse::error`] rather than in an
//! HTTP status, so callers always parse one shape. There is no retry.

use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendRegistry};
use crate::config::ResearchSettings;
use crate::env_file::ModelEnvWriter;
use crate::error::RunError;
use crate::process::{ProcessCommand, ProcessEnv, run_backend_process};
use crate::report::extract_and_rename_report;

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub model_label: String,
}

impl ResearchResponse {
    fn failed(model_label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            model_label: model_label.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    BackendResolved,
    ConfigUpdated,
    ProcessRan,
    ReportExtracted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::BackendResolved => "backend_resolved",
            Stage::ConfigUpdated => "config_updated",
            Stage::ProcessRan => "process_ran",
            Stage::ReportExtracted => "report_extracted",
        };
        f.write_str(name)
    }
}

/// Runs research requests against the configured backends.
///
/// Requests for the same backend are serialized; they share the env file
/// and the well-known report path.
pub struct ResearchService {
    registry: Arc<BackendRegistry>,
    settings: ResearchSettings,
    command: ProcessCommand,
    locks: DashMap<Backend, Arc<Mutex<()>>>,
}

impl ResearchService {
    pub fn new(registry: Arc<BackendRegistry>, settings: ResearchSettings) -> Result<Self, RunError> {
        let command = ProcessCommand::parse(&settings.command)?;
        Ok(Self {
            registry,
            settings,
            command,
            locks: DashMap::new(),
        })
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    fn lock_for(&self, backend: Backend) -> Arc<Mutex<()>> {
        self.locks.entry(backend).or_default().clone()
    }

    pub async fn run(&self, request: ResearchRequest) -> ResearchResponse {
        let topic = request.topic.trim().to_string();
        let model = request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_model.clone());
        let backend_name = request
            .backend
            .unwrap_or_else(|| Backend::LocalInference.as_str().to_string());

        info!(topic = %topic, model = %model, backend = %backend_name, stage = %Stage::Received, "Research request received");

        if topic.is_empty() {
            return fail(Stage::Received, model, "topic must not be empty");
        }

        let descriptor = match self.registry.resolve(&backend_name) {
            Ok(descriptor) => descriptor,
            Err(err) => return fail(Stage::Received, model, err.to_string()),
        };
        let model_label = descriptor.qualify_model(&model);
        debug!(
            backend = %descriptor.backend,
            project_dir = %descriptor.project_dir.display(),
            stage = %Stage::BackendResolved,
            "Backend resolved"
        );

        let lock = self.lock_for(descriptor.backend);
        let _guard = lock.lock().await;

        let env_path = descriptor.env_file_path();
        let update = match ModelEnvWriter::new(&self.registry, &self.settings.model_key)
            .update_model_config(&env_path, &model, &backend_name)
        {
            Ok(update) => update,
            Err(err) => {
                return fail(
                    Stage::BackendResolved,
                    model_label,
                    format!("Failed to update model configuration: {err}"),
                );
            }
        };
        debug!(path = %env_path.display(), identifier = %update.identifier, stage = %Stage::ConfigUpdated, "Model configuration updated");

        let environment = build_environment(
            std::env::vars_os(),
            &self.settings,
            &topic,
            &update.identifier,
        );

        let run = match run_backend_process(
            &descriptor.project_dir,
            &self.command,
            &environment,
            self.settings.timeout,
        )
        .await
        {
            Ok(run) => run,
            Err(err) => {
                return fail(
                    Stage::ConfigUpdated,
                    model_label,
                    format!("Research run '{}' failed: {err}", self.command.display()),
                );
            }
        };
        debug!(
            exit_code = run.exit_code,
            elapsed_ms = run.elapsed.as_millis() as u64,
            stage = %Stage::ProcessRan,
            "Orchestration finished"
        );

        let mut response = ResearchResponse {
            stdout_result: Some(run.stdout),
            model_label,
            ..Default::default()
        };

        match extract_and_rename_report(
            &descriptor.project_dir,
            &topic,
            &self.settings.report_filename,
        ) {
            Ok(Some(artifact)) => {
                response.report_content = Some(artifact.content);
                response.report_filename = artifact.final_filename;
                response.error = artifact.rename_warning;
            }
            Ok(None) => {
                response.error = Some(format!(
                    "No report file '{}' was produced in {}",
                    self.settings.report_filename,
                    descriptor.project_dir.display()
                ));
            }
            Err(err) => {
                warn!(error = %err, stage = %Stage::ProcessRan, "Report extraction failed");
                response.error = Some(err.to_string());
            }
        }

        info!(
            backend = %descriptor.backend,
            report = response.report_filename.as_deref().unwrap_or("none"),
            stage = %Stage::ReportExtracted,
            "Research request completed"
        );
        response
    }
}

fn fail(stage: Stage, model_label: impl Into<String>, message: impl Into<String>) -> ResearchResponse {
    let message = message.into();
    error!(stage = %stage, error = %message, "Research request failed");
    ResearchResponse::failed(model_label, message)
}

/// Child environment: `parent`, then configured secrets, then topic and model.
///
/// Secrets are only carried when `parent` has them; nothing is invented.
pub fn build_environment<I>(
    parent: I,
    settings: &ResearchSettings,
    topic: &str,
    model_identifier: &str,
) -> ProcessEnv
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let parent: Vec<(OsString, OsString)> = parent.into_iter().collect();

    let secrets: Vec<(OsString, OsString)> = settings
        .secrets
        .iter()
        .filter_map(|name| {
            let found = parent
                .iter()
                .find(|(key, _)| key.as_os_str() == name.as_str())
                .map(|(key, value)| (key.clone(), value.clone()));
            if found.is_none() {
                debug!(secret = %name, "Secret not set in server environment");
            }
            found
        })
        .collect();

    ProcessEnv::builder()
        .extend(parent)
        .extend(secrets)
        .var(settings.topic_env.as_str(), topic)
        .var(settings.model_key.as_str(), model_identifier)
        .build()
}
