//! Engine settings, layered with Figment: built-in defaults, then
//! `config.toml`, then `config.<env>.toml`, then `APP_*` env vars (`__`
//! separates nesting levels).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub knowledge_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { knowledge_dir: "knowledge".to_string() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Candidates pulled from an n-gram index before partitioning.
    pub top_k: usize,
    pub group_count: usize,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { top_k: 100, group_count: 5 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub max_concurrency: usize,
    pub task_timeout_secs: u64,
}

impl DispatchSettings {
    pub fn task_timeout(&self) -> Duration { Duration::from_secs(self.task_timeout_secs) }
}

impl Default for DispatchSettings {
    fn default() -> Self { Self { max_concurrency: 3, task_timeout_secs: 120 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSettings {
    /// Groups that must lead with the same code for a HIGH answer.
    pub high_agreement: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self { Self { high_agreement: 3 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub table_weight: f64,
    pub manual_weight: f64,
    pub high_threshold: f64,
    pub min_fused_score: f64,
    pub table_top_n: usize,
    pub table_min_similarity: f64,
    pub manual_top_k: usize,
    pub max_candidates: usize,
    pub path_timeout_secs: u64,
}

impl FusionSettings {
    pub fn path_timeout(&self) -> Duration { Duration::from_secs(self.path_timeout_secs) }
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            table_weight: 0.4,
            manual_weight: 0.6,
            high_threshold: 0.66,
            min_fused_score: 0.1,
            table_top_n: 15,
            table_min_similarity: 0.1,
            manual_top_k: 10,
            max_candidates: 2,
            path_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualSettings {
    /// Longer manual explanations are cut to this many characters.
    pub excerpt_chars: usize,
    /// Leading general interpretation rules attached to code comparisons.
    pub general_rules: usize,
}

impl Default for ManualSettings {
    fn default() -> Self { Self { excerpt_chars: 1000, general_rules: 6 } }
}

/// Typed view of every tunable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub search: SearchSettings,
    pub dispatch: DispatchSettings,
    pub consensus: ConsensusSettings,
    pub fusion: FusionSettings,
    pub manual: ManualSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let bad = |msg: String| Err(Error::InvalidConfig(msg));
        if self.search.top_k == 0 { return bad("search.top_k must be at least 1".into()); }
        if self.search.group_count == 0 { return bad("search.group_count must be at least 1".into()); }
        if self.dispatch.max_concurrency == 0 { return bad("dispatch.max_concurrency must be at least 1".into()); }
        if self.dispatch.task_timeout_secs == 0 { return bad("dispatch.task_timeout_secs must be at least 1".into()); }
        if self.consensus.high_agreement == 0 { return bad("consensus.high_agreement must be at least 1".into()); }
        let f = &self.fusion;
        for (name, v) in [
            ("fusion.table_weight", f.table_weight),
            ("fusion.manual_weight", f.manual_weight),
            ("fusion.high_threshold", f.high_threshold),
            ("fusion.min_fused_score", f.min_fused_score),
            ("fusion.table_min_similarity", f.table_min_similarity),
        ] {
            if !(0.0..=1.0).contains(&v) { return bad(format!("{name} must lie in [0, 1], got {v}")); }
        }
        if ((f.table_weight + f.manual_weight) - 1.0).abs() > 1e-9 {
            return bad(format!("fusion weights must sum to 1, got {} + {}", f.table_weight, f.manual_weight));
        }
        if f.max_candidates == 0 { return bad("fusion.max_candidates must be at least 1".into()); }
        Ok(())
    }

    /// Knowledge directory with `~` and env vars expanded.
    pub fn knowledge_dir(&self) -> PathBuf { expand_path(&self.data.knowledge_dir) }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> { Self::load_from(Path::new(".")) }

    /// Load with config files looked up in `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match env {
            "prod" | "production" if !settings.knowledge_dir().is_dir() => Err(anyhow::anyhow!(
                "knowledge directory {} does not exist",
                settings.knowledge_dir().display()
            )),
            _ => Ok(()),
        }
    }
}

/// `~` and `$VAR`/`${VAR}` expanded; unknown variables are left as written.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let raw = input.as_ref();
    let with_vars = shellexpand::env(raw).unwrap_or(std::borrow::Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_vars).as_ref())
}
