//! # Configuration
//!
//! `flare.toml` drives every component. All sections and keys are optional;
//! missing values fall back to defaults that work against a local AFL++
//! campaign and an OpenAI-compatible endpoint.
//!
//! ```toml
//! playbook = "playbook.toml"
//!
//! [relay]
//! backend = "chat-server"
//! base_url = "http://localhost:5001"
//!
//! [exec]
//! output_policy = "truncated"
//!
//! [fuzz]
//! root = "/srv/fuzz"
//! corpus_layouts = ["flat"]
//! replay = { mode = "tool", program = "afl-showmap", args = ["-o", "/dev/null", "--", "{binary}", "{input}"] }
//! ```

use crate::error::{Error, Result};
use crate::exec::{OutputPolicy, SandboxedExecutor};
use crate::provider::ProviderConfig;
use crate::triage::{BinaryStrategy, CorpusLayout, ReplayStrategy};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the current directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "flare.toml";
/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "FLARE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlareConfig {
    pub relay: RelayConfig,
    pub workspace: WorkspaceConfig,
    pub exec: ExecConfig,
    pub fuzz: FuzzConfig,
    /// Guidance document merged into outbound prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayBackend {
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "chat-server")]
    ChatServer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub backend: RelayBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: RelayBackend::OpenAI,
            base_url: None,
            model: None,
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
            system_prompt: "You are a helpful assistant.".into(),
        }
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Provider settings, reading the API key from the environment
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        self.provider_config_with(|name| std::env::var(name).ok())
    }

    fn provider_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ProviderConfig> {
        let mut config = match self.backend {
            RelayBackend::OpenAI => {
                let key = lookup(&self.api_key_env).filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                    Error::config_invalid(format!("environment variable {} is not set", self.api_key_env))
                        .with_operation("config::provider")
                })?;
                ProviderConfig::openai(key)
            }
            RelayBackend::ChatServer => ProviderConfig::chat_server(),
        };
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        Ok(config.with_timeout(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".flare_workspace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    /// Shell program and the flags placed before the command string
    pub shell: Vec<String>,
    pub output_policy: OutputPolicy,
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: vec!["sh".into(), "-c".into()],
            output_policy: OutputPolicy::Full,
            timeout_secs: 300,
        }
    }
}

impl ExecConfig {
    pub fn executor(&self) -> SandboxedExecutor {
        SandboxedExecutor::new()
            .with_shell(self.shell.clone())
            .with_policy(self.output_policy)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzConfig {
    /// Directory holding one subdirectory per target
    pub root: PathBuf,
    /// Campaign output directory name inside a target
    pub output_dir: String,
    /// Fuzzer instance name inside the campaign output
    pub instance: String,
    /// Tried in order; the first existing crash directory wins
    pub corpus_layouts: Vec<CorpusLayout>,
    /// Tried in order; the first resolved binary wins
    pub binary_strategies: Vec<BinaryStrategy>,
    /// File names skipped when searching the campaign for the target binary
    pub non_binary_patterns: Vec<String>,
    /// File names in the crash directory that are not crash inputs
    pub corpus_ignore: Vec<String>,
    pub replay: ReplayStrategy,
    pub replay_timeout_secs: u64,
    pub status_tool: String,
    /// `{campaign}` is replaced with the campaign directory
    pub status_args: Vec<String>,
    pub status_timeout_secs: u64,
    /// Per-stream character budget in explanation prompts
    pub explain_max_chars: usize,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output_dir: "output".into(),
            instance: "default".into(),
            corpus_layouts: vec![CorpusLayout::Campaign, CorpusLayout::Flat],
            binary_strategies: vec![BinaryStrategy::ExpectedPath, BinaryStrategy::SearchCampaign],
            non_binary_patterns: [
                "README*", "*.txt", "*.md", ".*", "cmdline", "fuzzer_stats", "fuzzer_setup", "fuzz_bitmap",
                "plot_data",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            corpus_ignore: vec!["README.txt".into()],
            replay: ReplayStrategy::Direct,
            replay_timeout_secs: 30,
            status_tool: "afl-whatsup".into(),
            status_args: vec!["-s".into(), "{campaign}".into()],
            status_timeout_secs: 60,
            explain_max_chars: 4000,
        }
    }
}

impl FuzzConfig {
    pub fn replay_timeout(&self) -> Duration {
        Duration::from_secs(self.replay_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }
}

impl FlareConfig {
    /// Parse a config file.
    ///
    /// A relative playbook path is taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;

        let mut config = Self::parse(&text).map_err(|e| e.with_context("path", path.display().to_string()))?;

        if let (Some(playbook), Some(dir)) = (&config.playbook, path.parent()) {
            if playbook.is_relative() {
                config.playbook = Some(dir.join(playbook));
            }
        }
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate config text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            Error::config_invalid(e.message().to_string())
                .with_operation("config::parse")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, else `$FLARE_CONFIG`, else `./flare.toml`, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let env = std::env::var_os(CONFIG_ENV);
        match config_path(explicit, env, Path::new(DEFAULT_CONFIG_FILE)) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(Error::config_invalid(message).with_operation("config::validate"))
        };

        if self.exec.shell.is_empty() {
            return invalid("exec.shell must name a program");
        }
        if self.fuzz.corpus_layouts.is_empty() {
            return invalid("fuzz.corpus_layouts must list at least one layout");
        }
        if self.fuzz.status_tool.trim().is_empty() {
            return invalid("fuzz.status_tool must not be empty");
        }
        if let ReplayStrategy::Tool { program, .. } = &self.fuzz.replay {
            if program.trim().is_empty() {
                return invalid("fuzz.replay.program must not be empty");
            }
        }
        for (name, secs) in [
            ("relay.timeout_secs", self.relay.timeout_secs),
            ("exec.timeout_secs", self.exec.timeout_secs),
            ("fuzz.replay_timeout_secs", self.fuzz.replay_timeout_secs),
            ("fuzz.status_timeout_secs", self.fuzz.status_timeout_secs),
        ] {
            if secs == 0 {
                return invalid(&format!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

fn config_path(explicit: Option<&Path>, env: Option<OsString>, fallback: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    fallback.is_file().then(|| fallback.to_path_buf())
}
