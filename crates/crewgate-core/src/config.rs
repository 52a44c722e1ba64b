use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{Backend, BackendDescriptor, BackendRegistry};
use crate::env_file::DEFAULT_MODEL_KEY;
use crate::inference::{DEFAULT_INFERENCE_URL, normalize_base_url};
use crate::models::DEFAULT_CLOUD_MODELS;
use crate::report::DEFAULT_REPORT_FILENAME;

const CONFIG_ENV: &str = "CREWGATE_CONFIG";
const CONFIG_FILE: &str = "crewgate.toml";

#[derive(Debug, Clone)]
pub struct CrewgateConfig {
    pub host: String,
    pub port: u16,
    pub inference: InferenceSettings,
    pub research: ResearchSettings,
    pub backends: Vec<BackendDescriptor>,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub url: String,
    pub chat_timeout: Duration,
    pub models_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Shell-style command line of the orchestration tool.
    pub command: String,
    pub timeout: Duration,
    pub model_key: String,
    pub topic_env: String,
    pub report_filename: String,
    pub default_model: String,
    /// Variables copied from the server environment when present.
    pub secrets: Vec<String>,
    pub cloud_models: Vec<String>,
}

impl Default for CrewgateConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            inference: InferenceSettings::default(),
            research: ResearchSettings::default(),
            backends: default_backends(),
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_INFERENCE_URL.to_string(),
            chat_timeout: Duration::from_secs(30),
            models_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            command: "crewai run".to_string(),
            timeout: Duration::from_secs(300),
            model_key: DEFAULT_MODEL_KEY.to_string(),
            topic_env: "TOPIC".to_string(),
            report_filename: DEFAULT_REPORT_FILENAME.to_string(),
            default_model: "smollm2:135m".to_string(),
            secrets: default_secrets(),
            cloud_models: default_cloud_models(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    inference: InferenceSection,
    #[serde(default)]
    research: ResearchSection,
    #[serde(default)]
    backends: BackendsSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct InferenceSection {
    url: Option<String>,
    chat_timeout_secs: Option<u64>,
    models_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ResearchSection {
    command: Option<String>,
    timeout_secs: Option<u64>,
    model_key: Option<String>,
    topic_env: Option<String>,
    report_filename: Option<String>,
    default_model: Option<String>,
    secrets: Option<Vec<String>>,
    cloud_models: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendsSection {
    local_inference: Option<BackendSection>,
    cloud_generative: Option<BackendSection>,
}

#[derive(Debug, Deserialize)]
struct BackendSection {
    project_dir: PathBuf,
    #[serde(default)]
    env_file: Option<PathBuf>,
    #[serde(default)]
    model_prefix: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_secrets() -> Vec<String> {
    ["GOOGLE_API_KEY", "GEMINI_API_KEY", "OPENAI_API_KEY"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cloud_models() -> Vec<String> {
    DEFAULT_CLOUD_MODELS.iter().map(|s| s.to_string()).collect()
}

fn default_project_dir(backend: Backend) -> PathBuf {
    match backend {
        Backend::LocalInference => PathBuf::from("crewai_ollama_native"),
        Backend::CloudGenerative => PathBuf::from("crewai_gemini"),
    }
}

fn default_backends() -> Vec<BackendDescriptor> {
    Backend::ALL
        .into_iter()
        .map(|backend| BackendDescriptor::new(backend, default_project_dir(backend)))
        .collect()
}

impl CrewgateConfig {
    pub fn load() -> anyhow::Result<Self> {
        if let Some(file_config) = load_from_file()? {
            return Ok(Self::from_file(file_config));
        }

        Ok(Self::from_env())
    }

    /// Parse a TOML document; absent fields take their defaults.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let parsed: FileConfig = toml::from_str(contents)?;
        Ok(Self::from_file(parsed))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn registry(&self) -> BackendRegistry {
        BackendRegistry::new(self.backends.iter().cloned())
    }

    fn from_file(file: FileConfig) -> Self {
        let defaults = Self::default();
        let inference = InferenceSettings {
            url: file
                .inference
                .url
                .map(|url| normalize_base_url(&url))
                .unwrap_or(defaults.inference.url),
            chat_timeout: file
                .inference
                .chat_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.inference.chat_timeout),
            models_timeout: file
                .inference
                .models_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.inference.models_timeout),
        };

        let r = file.research;
        let d = defaults.research;
        let research = ResearchSettings {
            command: r.command.unwrap_or(d.command),
            timeout: r.timeout_secs.map(Duration::from_secs).unwrap_or(d.timeout),
            model_key: r.model_key.unwrap_or(d.model_key),
            topic_env: r.topic_env.unwrap_or(d.topic_env),
            report_filename: r.report_filename.unwrap_or(d.report_filename),
            default_model: r.default_model.unwrap_or(d.default_model),
            secrets: r.secrets.unwrap_or(d.secrets),
            cloud_models: r.cloud_models.unwrap_or(d.cloud_models),
        };

        let backends = vec![
            backend_from_section(Backend::LocalInference, file.backends.local_inference),
            backend_from_section(Backend::CloudGenerative, file.backends.cloud_generative),
        ];

        Self {
            host: file.server.host,
            port: file.server.port,
            inference,
            research,
            backends,
        }
    }

    fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("CREWGATE_HOST") {
            config.host = host;
        }
        if let Some(port) = env::var("CREWGATE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.port = port;
        }
        if let Ok(url) = env::var("CREWGATE_INFERENCE_URL").or_else(|_| env::var("OLLAMA_API_URL"))
        {
            config.inference.url = normalize_base_url(&url);
        }
        if let Ok(command) = env::var("CREWGATE_RESEARCH_COMMAND") {
            config.research.command = command;
        }
        if let Some(secs) = env::var("CREWGATE_RESEARCH_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            config.research.timeout = Duration::from_secs(secs);
        }

        for descriptor in &mut config.backends {
            let var = match descriptor.backend {
                Backend::LocalInference => "CREWGATE_LOCAL_PROJECT_DIR",
                Backend::CloudGenerative => "CREWGATE_CLOUD_PROJECT_DIR",
            };
            if let Ok(dir) = env::var(var)
                && !dir.trim().is_empty()
            {
                descriptor.project_dir = PathBuf::from(dir);
            }
        }

        config
    }
}

fn backend_from_section(backend: Backend, section: Option<BackendSection>) -> BackendDescriptor {
    let Some(section) = section else {
        return BackendDescriptor::new(backend, default_project_dir(backend));
    };
    let mut descriptor = BackendDescriptor::new(backend, section.project_dir);
    if let Some(env_file) = section.env_file {
        descriptor = descriptor.with_env_file(env_file);
    }
    if let Some(prefix) = section.model_prefix {
        descriptor = descriptor.with_model_prefix(prefix);
    }
    descriptor
}

fn load_from_file() -> anyhow::Result<Option<FileConfig>> {
    let config_path = env::var(CONFIG_ENV).ok();
    let path = if let Some(path) = config_path {
        Some(path)
    } else if Path::new(CONFIG_FILE).exists() {
        Some(CONFIG_FILE.to_string())
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
    let parsed: FileConfig = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path, err))?;
    Ok(Some(parsed))
}
