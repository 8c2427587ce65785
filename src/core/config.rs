//! Configuration from YAML
//!
//! A config directory holds pipeline definitions (`pipelines/*.yml`), the
//! environment catalog (`environments.yml` or `environments/*.yml`), stage and
//! notifier plugins (`plugins.yml`) and engine settings (`engine.yml`).

use super::definition::{ConfigMap, GateRequirement, PipelineDefinition, StageDefinition};
use super::environment::{Environment, EnvironmentCatalog};
use super::validator::is_valid_pipeline_name;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Source of pipeline definitions
pub trait DefinitionProvider: Send + Sync {
    /// Load a definition by name; `Ok(None)` when no such pipeline exists
    fn load_pipeline_definition(&self, name: &str) -> Result<Option<PipelineDefinition>, ConfigError>;

    /// Names of all known pipelines, sorted
    fn list_pipelines(&self) -> Result<Vec<String>, ConfigError>;
}

/// Pipeline configuration as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Overall timeout in seconds
    #[serde(default)]
    pub timeout: Option<i64>,

    #[serde(default)]
    pub environments: Vec<String>,

    /// Variable defaults; scalar values of any type are accepted
    #[serde(default)]
    variables: HashMap<String, Value>,

    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Stage configuration as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub stage_type: String,

    #[serde(default)]
    pub config: ConfigMap,

    #[serde(rename = "depends-on", alias = "dependsOn", alias = "depends_on", default)]
    pub depends_on: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub retry: Option<i64>,

    /// Per-attempt timeout in seconds
    #[serde(default)]
    pub timeout: Option<i64>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub gates: Vec<GateConfig>,
}

/// A gate entry: either a bare gate type or a map with `type` and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateConfig {
    Name(String),
    Detailed {
        #[serde(rename = "type")]
        gate_type: String,
        #[serde(flatten)]
        config: ConfigMap,
    },
}

fn default_true() -> bool {
    true
}

/// `max-critical` -> `maxCritical`, so YAML may use either spelling
fn camel_case_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl GateConfig {
    pub fn to_requirement(&self) -> GateRequirement {
        match self {
            GateConfig::Name(name) => GateRequirement::new(name.clone()),
            GateConfig::Detailed { gate_type, config } => GateRequirement {
                gate_type: gate_type.clone(),
                config: config
                    .iter()
                    .map(|(k, v)| (camel_case_key(k), v.clone()))
                    .collect(),
            },
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = read_file(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Variables as strings; non-string scalars are rendered with YAML formatting
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => String::new(),
                    other => serde_yaml::to_string(other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Convert config to the immutable definition model
    pub fn to_definition(&self) -> PipelineDefinition {
        PipelineDefinition {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            stages: self.stages.iter().map(StageConfig::to_definition).collect(),
            environments: self.environments.clone(),
            variables: self.variables_as_string_map(),
            timeout: self.timeout,
        }
    }
}

impl StageConfig {
    pub fn to_definition(&self) -> StageDefinition {
        StageDefinition {
            name: self.name.clone(),
            stage_type: self.stage_type.clone(),
            config: self.config.clone(),
            depends_on: self.depends_on.clone(),
            enabled: self.enabled,
            retry: self.retry,
            timeout: self.timeout,
            environment: self.environment.clone(),
            target: self.target.clone(),
            gates: self.gates.iter().map(GateConfig::to_requirement).collect(),
        }
    }
}

/// What a configured plugin provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    #[default]
    Stage,
    Notifier,
}

/// One entry of `plugins.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub kind: PluginKind,

    #[serde(default = "default_plugin_version")]
    pub version: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program run by command-backed stage plugins
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the command
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_plugin_version() -> String {
    "1.0.0".to_string()
}

/// Contents of `plugins.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

/// Engine tuning from `engine.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Worker pool size; defaults to `max(2, available_parallelism)`
    #[serde(default, alias = "max-parallel-stages")]
    pub max_parallel_stages: Option<usize>,

    /// Base delay between retries; attempt `i` waits `i * base`
    #[serde(default = "default_retry_base_delay_ms", alias = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Stop launching stages after the first failure
    #[serde(default = "default_true", alias = "fail-fast")]
    pub fail_fast: bool,
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel_stages: None,
            retry_base_delay_ms: default_retry_base_delay_ms(),
            fail_fast: true,
        }
    }
}

impl EngineSettings {
    /// Number of stages allowed to run at once
    pub fn worker_permits(&self) -> usize {
        self.max_parallel_stages.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .max(2)
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct EnvironmentsFile {
    #[serde(default)]
    environments: Vec<Environment>,
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// YAML files directly inside `dir`, sorted by path
fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads configuration from a directory on disk
#[derive(Debug, Clone)]
pub struct ConfigurationLoader {
    config_dir: PathBuf,
}

impl ConfigurationLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn pipelines_dir(&self) -> PathBuf {
        self.config_dir.join("pipelines")
    }

    fn pipeline_file(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_pipeline_name(name) {
            warn!("Rejecting pipeline name '{}'", name);
            return None;
        }
        ["yml", "yaml"]
            .iter()
            .map(|ext| self.pipelines_dir().join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
    }

    /// Load the environment catalog
    ///
    /// `environments.yml` takes precedence over an `environments/` directory.
    pub fn load_environments(&self) -> Result<EnvironmentCatalog, ConfigError> {
        let file = self.config_dir.join("environments.yml");
        let dir = self.config_dir.join("environments");

        let environments = if file.is_file() {
            parse_file::<EnvironmentsFile>(&file)?.environments
        } else if dir.is_dir() {
            yaml_files(&dir)?
                .iter()
                .map(|path| parse_file::<Environment>(path))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            warn!("No environment configuration found in {}", self.config_dir.display());
            Vec::new()
        };

        info!("Loaded {} environments", environments.len());
        Ok(EnvironmentCatalog::from_environments(environments))
    }

    /// Load `plugins.yml`, or nothing if absent
    pub fn load_plugins(&self) -> Result<PluginsConfig, ConfigError> {
        let path = self.config_dir.join("plugins.yml");
        if !path.is_file() {
            debug!("No plugin configuration at {}", path.display());
            return Ok(PluginsConfig::default());
        }
        parse_file(&path)
    }

    /// Load `engine.yml`, or defaults if absent
    pub fn load_engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let path = self.config_dir.join("engine.yml");
        if !path.is_file() {
            return Ok(EngineSettings::default());
        }
        parse_file(&path)
    }
}

impl DefinitionProvider for ConfigurationLoader {
    fn load_pipeline_definition(&self, name: &str) -> Result<Option<PipelineDefinition>, ConfigError> {
        let Some(path) = self.pipeline_file(name) else {
            return Ok(None);
        };
        debug!("Loading pipeline '{}' from {}", name, path.display());
        let config = PipelineConfig::from_file(&path)?;
        Ok(Some(config.to_definition()))
    }

    fn list_pipelines(&self) -> Result<Vec<String>, ConfigError> {
        let dir = self.pipelines_dir();
        if !dir.is_dir() {
            warn!("Pipeline directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = yaml_files(&dir)?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Definitions held in memory, keyed by pipeline name
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    definitions: RwLock<HashMap<String, PipelineDefinition>>,
}

impl InMemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, definition: PipelineDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn insert(&self, definition: PipelineDefinition) {
        self.definitions
            .write()
            .insert(definition.name.clone(), definition);
    }
}

impl DefinitionProvider for InMemoryDefinitions {
    fn load_pipeline_definition(&self, name: &str) -> Result<Option<PipelineDefinition>, ConfigError> {
        Ok(self.definitions.read().get(name).cloned())
    }

    fn list_pipelines(&self) -> Result<Vec<String>, ConfigError> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
