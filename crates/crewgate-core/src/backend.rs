//! Closed set of research backends and where each one lives on disk.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A configured destination for language-model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Locally-run inference server reached over HTTP.
    LocalInference,
    /// Cloud generative-AI API.
    CloudGenerative,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::LocalInference, Backend::CloudGenerative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::LocalInference => "local-inference",
            Backend::CloudGenerative => "cloud-generative",
        }
    }

    /// Default model namespace token prepended to model identifiers.
    pub fn default_prefix(&self) -> String {
        format!("{}/", self.as_str())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported backend '{}'", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local-inference" => Ok(Backend::LocalInference),
            "cloud-generative" => Ok(Backend::CloudGenerative),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Immutable description of one backend's orchestration project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub backend: Backend,
    pub project_dir: PathBuf,
    /// Env file path relative to `project_dir`.
    pub env_file: PathBuf,
    pub model_prefix: String,
}

impl BackendDescriptor {
    pub fn new(backend: Backend, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            project_dir: project_dir.into(),
            env_file: PathBuf::from(".env"),
            model_prefix: backend.default_prefix(),
        }
    }

    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = env_file.into();
        self
    }

    pub fn with_model_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.model_prefix = prefix.into();
        self
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.project_dir.join(&self.env_file)
    }

    /// Prefix `model` with this backend's namespace unless it already carries it.
    pub fn qualify_model(&self, model: &str) -> String {
        apply_prefix(&self.model_prefix, model)
    }
}

/// Prepend `prefix` to `model` at most once.
pub fn apply_prefix(prefix: &str, model: &str) -> String {
    if prefix.is_empty() || model.starts_with(prefix) {
        model.to_string()
    } else {
        format!("{prefix}{model}")
    }
}

/// Read-only lookup from backend to descriptor.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    descriptors: BTreeMap<Backend, BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = BackendDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.backend, descriptor))
                .collect(),
        }
    }

    pub fn get(&self, backend: Backend) -> Option<&BackendDescriptor> {
        self.descriptors.get(&backend)
    }

    /// Resolve a backend by its wire name.
    pub fn resolve(&self, name: &str) -> Result<&BackendDescriptor, UnknownBackend> {
        let backend = name.parse::<Backend>()?;
        self.get(backend)
            .ok_or_else(|| UnknownBackend(name.to_string()))
    }

    pub fn project_dir(&self, backend: Backend) -> Option<&Path> {
        self.get(backend).map(|d| d.project_dir.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.values()
    }
}
