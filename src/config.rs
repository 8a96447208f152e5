use crate::CuebenchError;
use crate::pairing::PairingPolicy;
use crate::remap::RoleMappingPolicy;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Every option the build and evaluation steps recognise. Loaded once and
/// passed down explicitly.
#[derive(Debug, Deserialize, Clone)]
pub struct CuebenchConfig {
    /// Also write the unified dataset to `inspection_path`.
    #[serde(default)]
    pub save_inspection_copy: bool,
    #[serde(default = "default_inspection_path")]
    pub inspection_path: PathBuf,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub data: DataPaths,
    #[serde(default)]
    pub stitch: StitchConfig,
    #[serde(default, deserialize_with = "model_section")]
    pub model: ModelConfig,
    #[serde(default = "ModelConfig::judge_default", deserialize_with = "judge_section")]
    pub judge: ModelConfig,
}

impl Default for CuebenchConfig {
    fn default() -> Self {
        Self {
            save_inspection_copy: false,
            inspection_path: default_inspection_path(),
            seed: default_seed(),
            data: DataPaths::default(),
            stitch: StitchConfig::default(),
            model: ModelConfig::default(),
            judge: ModelConfig::judge_default(),
        }
    }
}

fn default_inspection_path() -> PathBuf {
    "unified_input_samples.json".into()
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataPaths {
    #[serde(default = "default_conversations")]
    pub conversations: PathBuf,
    #[serde(default = "default_cue_queries")]
    pub cue_queries: PathBuf,
    #[serde(default = "default_stitched")]
    pub stitched: PathBuf,
    #[serde(default = "default_unified")]
    pub unified: PathBuf,
    /// Use only the first N cue/query records.
    #[serde(default)]
    pub sample_limit: Option<usize>,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            conversations: default_conversations(),
            cue_queries: default_cue_queries(),
            stitched: default_stitched(),
            unified: default_unified(),
            sample_limit: None,
        }
    }
}

fn default_conversations() -> PathBuf {
    "data/locomo10.json".into()
}

fn default_cue_queries() -> PathBuf {
    "data/locomo_plus.json".into()
}

fn default_stitched() -> PathBuf {
    "data/stitched_contexts.json".into()
}

fn default_unified() -> PathBuf {
    "data/unified_input_samples.json".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StitchConfig {
    #[serde(default)]
    pub pairing: PairingPolicy,
    #[serde(default)]
    pub role_mapping: RoleMappingPolicy,
    /// Pairing attempts per record before it is given up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_synthetic_step_days")]
    pub synthetic_step_days: i64,
    #[serde(default = "default_jitter_min")]
    pub jitter_min_minutes: i64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max_minutes: i64,
    #[serde(default = "default_same_day_offset")]
    pub same_day_offset_minutes: i64,
    /// Leave sessions dated after the query out of the rendered prompt.
    #[serde(default)]
    pub truncate_after_query: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            pairing: PairingPolicy::default(),
            role_mapping: RoleMappingPolicy::default(),
            max_attempts: default_max_attempts(),
            synthetic_step_days: default_synthetic_step_days(),
            jitter_min_minutes: default_jitter_min(),
            jitter_max_minutes: default_jitter_max(),
            same_day_offset_minutes: default_same_day_offset(),
            truncate_after_query: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_synthetic_step_days() -> i64 {
    7
}

fn default_jitter_min() -> i64 {
    30
}

fn default_jitter_max() -> i64 {
    180
}

fn default_same_day_offset() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Offline placeholder with the same I/O shape as a real model.
    #[default]
    Echo,
    /// OpenAI-compatible chat completions.
    Openai,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "echo" => Ok(BackendKind::Echo),
            "openai" => Ok(BackendKind::Openai),
            other => Err(format!("unknown backend {other:?} (expected echo or openai)")),
        }
    }
}

/// Backend settings shared by the evaluation runner and the judge.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub backend: BackendKind,
    pub model: String,
    pub endpoint: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

/// `[model]` / `[judge]` as written; unset keys keep the section's defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    backend: Option<BackendKind>,
    model: Option<String>,
    endpoint: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
}

impl ModelSection {
    fn over(self, base: ModelConfig) -> ModelConfig {
        ModelConfig {
            backend: self.backend.unwrap_or(base.backend),
            model: self.model.unwrap_or(base.model),
            endpoint: self.endpoint.unwrap_or(base.endpoint),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

fn model_section<'de, D: Deserializer<'de>>(d: D) -> Result<ModelConfig, D::Error> {
    Ok(ModelSection::deserialize(d)?.over(ModelConfig::default()))
}

fn judge_section<'de, D: Deserializer<'de>>(d: D) -> Result<ModelConfig, D::Error> {
    Ok(ModelSection::deserialize(d)?.over(ModelConfig::judge_default()))
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ModelConfig {
    pub fn judge_default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: 512,
            ..Self::default()
        }
    }
}

fn default_model() -> String {
    "mock".into()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_concurrency() -> usize {
    1
}

fn default_timeout() -> u64 {
    60
}

/// Load config from an explicit path (CLI flag or CUEBENCH_CONFIG),
/// ./cuebench.toml, or defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<CuebenchConfig, CuebenchError> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(CuebenchError::Configuration(format!(
                "config file not found: {}",
                p.display()
            )));
        }
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from("cuebench.toml")).filter(|p| p.exists()),
    };
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(&p)?;
            parse_config(&content).map_err(|e| match e {
                CuebenchError::Configuration(msg) => {
                    CuebenchError::Configuration(format!("{}: {msg}", p.display()))
                }
                other => other,
            })
        }
        None => Ok(CuebenchConfig::default()),
    }
}

pub fn parse_config(content: &str) -> Result<CuebenchConfig, CuebenchError> {
    let config: CuebenchConfig =
        toml::from_str(content).map_err(|e| CuebenchError::Configuration(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Ten years: far beyond any LoCoMo span.
const MAX_STEP_DAYS: i64 = 3650;
/// One day: jitter and same-day offsets stay within the anchor's day.
const MAX_OFFSET_MINUTES: i64 = 24 * 60;

pub fn validate_config(config: &CuebenchConfig) -> Result<(), CuebenchError> {
    let s = &config.stitch;
    if s.max_attempts == 0 {
        return Err(CuebenchError::Configuration("stitch.max_attempts must be at least 1".into()));
    }
    if !(1..=MAX_STEP_DAYS).contains(&s.synthetic_step_days) {
        return Err(CuebenchError::Configuration(format!(
            "stitch.synthetic_step_days must be between 1 and {MAX_STEP_DAYS}"
        )));
    }
    if s.jitter_min_minutes < 0
        || s.jitter_min_minutes > s.jitter_max_minutes
        || s.jitter_max_minutes > MAX_OFFSET_MINUTES
    {
        return Err(CuebenchError::Configuration(format!(
            "stitch jitter range [{}, {}] is invalid (bounds 0..={MAX_OFFSET_MINUTES})",
            s.jitter_min_minutes, s.jitter_max_minutes
        )));
    }
    if !(0..=MAX_OFFSET_MINUTES).contains(&s.same_day_offset_minutes) {
        return Err(CuebenchError::Configuration(format!(
            "stitch.same_day_offset_minutes must be between 0 and {MAX_OFFSET_MINUTES}"
        )));
    }
    for (name, m) in [("model", &config.model), ("judge", &config.judge)] {
        if m.concurrency == 0 {
            return Err(CuebenchError::Configuration(format!("{name}.concurrency must be at least 1")));
        }
        if !(0.0..=2.0).contains(&m.temperature) {
            return Err(CuebenchError::Configuration(format!(
                "{name}.temperature {} is outside [0, 2]",
                m.temperature
            )));
        }
    }
    Ok(())
}
