use crate::analyzer::aggregator::DEFAULT_FLAG_THRESHOLD;
use crate::analyzer::llm_client::BackendConfig;
use crate::analyzer::local_runtime::{LocalModelSource, LocalRuntimeConfig, DEFAULT_SERVER_PROGRAM};
use crate::analyzer::prompts::DEFAULT_MAX_SCRIPT_CHARS;
use crate::analyzer::remote::{RemoteConfig, DEFAULT_API_KEY};
use crate::error::ScanError;
use crate::extractor::config::{ExtractorConfig, DEFAULT_BLENDER_EXECUTABLE, DEFAULT_EXTRACT_TIMEOUT_SECS};
use crate::pipeline::RunConfig;
use clap::Parser;
use std::path::PathBuf;

pub const TIMEOUT_ENV: &str = "BLENDSCAN_TIMEOUT";
pub const BLENDER_ENV: &str = "BLENDER_EXECUTABLE";
pub const API_KEY_ENV: &str = "LMSTUDIO_API_KEY";

#[derive(Parser, Debug)]
#[command(name = "blendscan")]
#[command(about = "Extract Python scripts embedded in a .blend file and rate them with an LLM, without running them")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the .blend file to analyze
    #[arg(long)]
    pub filepath: PathBuf,

    /// Blender executable used for headless extraction
    #[arg(long, conflicts_with = "extractor_exec")]
    pub blender_exec: Option<String>,

    /// Alternative extractor called as `<exe> <container> <output_dir>`
    #[arg(long)]
    pub extractor_exec: Option<String>,

    /// OpenAI-compatible API base URL (e.g. http://localhost:1234/v1); selects the remote backend
    #[arg(long, requires = "lmstudio_model")]
    pub lmstudio_api: Option<String>,

    /// Model name served by the remote API
    #[arg(long, requires = "lmstudio_api")]
    pub lmstudio_model: Option<String>,

    /// API key for the remote backend
    #[arg(long)]
    pub api_key: Option<String>,

    /// llama-server executable for the local backend
    #[arg(long, default_value = DEFAULT_SERVER_PROGRAM)]
    pub llama_server: String,

    /// Local GGUF model file
    #[arg(long, conflicts_with = "hf_repo")]
    pub model: Option<PathBuf>,

    /// Hugging Face model for the local backend (repo:quant)
    #[arg(long)]
    pub hf_repo: Option<String>,

    /// Directory receiving extracted scripts and the report
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum time per analysis request in seconds (10-600)
    #[arg(short = 't', long, default_value = "180", value_parser = validate_timeout)]
    pub timeout: u64,

    /// Maximum time for extraction in seconds (1-3600)
    #[arg(long, default_value_t = DEFAULT_EXTRACT_TIMEOUT_SECS, value_parser = validate_extract_timeout)]
    pub extract_timeout: u64,

    /// Concurrent analysis requests (default 1 local, 2 remote)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub jobs: Option<u64>,

    /// Longest script text sent to the model, in characters
    #[arg(long, default_value_t = DEFAULT_MAX_SCRIPT_CHARS, value_parser = validate_positive)]
    pub max_script_chars: usize,

    /// Generation limit per request (default 1024 local, endpoint default remote)
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Scores above this count as flagged (0-10)
    #[arg(long, default_value_t = DEFAULT_FLAG_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub flag_threshold: u8,

    /// Enable verbose output to stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Enable debug output including backend communications
    #[arg(short = 'd', long)]
    pub debug: bool,
}

impl Cli {
    pub fn parse_args() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if !(10..=600).contains(&self.get_timeout_seconds()) {
            return Err(ScanError::InvalidArguments(
                "Timeout must be between 10 and 600 seconds".to_string(),
            ));
        }

        if let Some(ref url) = self.lmstudio_api {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ScanError::InvalidArguments(format!(
                    "--lmstudio-api must be an http(s) URL: {}",
                    url
                )));
            }
        }

        Ok(())
    }

    pub fn is_remote(&self) -> bool {
        self.lmstudio_api.is_some()
    }

    /// `--blender-exec`, then `BLENDER_EXECUTABLE`, then `blender` on PATH.
    pub fn get_blender_executable(&self) -> String {
        if let Some(ref exec) = self.blender_exec {
            return exec.clone();
        }
        match std::env::var(BLENDER_ENV) {
            Ok(exec) if !exec.trim().is_empty() => exec,
            _ => DEFAULT_BLENDER_EXECUTABLE.to_string(),
        }
    }

    pub fn get_api_key(&self) -> String {
        if let Some(ref key) = self.api_key {
            return key.clone();
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => key,
            _ => DEFAULT_API_KEY.to_string(),
        }
    }

    pub fn get_timeout_seconds(&self) -> u64 {
        // Check environment variable override
        if let Ok(timeout_str) = std::env::var(TIMEOUT_ENV) {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                if (10..=600).contains(&timeout) {
                    return timeout;
                }
            }
        }
        self.timeout
    }

    pub fn get_jobs(&self) -> usize {
        match self.jobs {
            Some(jobs) => jobs as usize,
            None if self.is_remote() => 2,
            None => 1,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose || self.debug
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn should_use_color(&self) -> bool {
        // Disable color if NO_COLOR environment variable is set
        std::env::var("NO_COLOR").is_err()
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        let config = match self.extractor_exec {
            Some(ref exec) => ExtractorConfig::generic(exec.clone()),
            None => ExtractorConfig::blender(self.get_blender_executable()),
        };
        config.with_timeout(self.extract_timeout)
    }

    pub fn backend_config(&self) -> BackendConfig {
        let timeout = self.get_timeout_seconds();
        match (&self.lmstudio_api, &self.lmstudio_model) {
            (Some(url), Some(model)) => BackendConfig::Remote(
                RemoteConfig::new(url.clone(), model.clone())
                    .with_api_key(Some(self.get_api_key()))
                    .with_timeout(timeout),
            ),
            _ => {
                let mut local = LocalRuntimeConfig::default()
                    .with_server_program(self.llama_server.clone())
                    .with_timeout(timeout);
                if let Some(ref path) = self.model {
                    local = local.with_model(LocalModelSource::Path(path.clone()));
                } else if let Some(ref repo) = self.hf_repo {
                    local = local.with_model(LocalModelSource::HuggingFace(repo.clone()));
                }
                BackendConfig::Local(local)
            }
        }
    }

    pub fn to_run_config(&self) -> Result<RunConfig, ScanError> {
        self.validate()?;

        let mut config = RunConfig::new(
            self.filepath.clone(),
            self.extractor_config(),
            self.backend_config(),
        )
        .with_output_dir(self.output_dir.clone())
        .with_jobs(self.get_jobs())
        .with_max_script_chars(self.max_script_chars)
        .with_flag_threshold(self.flag_threshold);

        if self.max_tokens.is_some() {
            config = config.with_max_tokens(self.max_tokens);
        }

        Ok(config)
    }
}

fn validate_timeout(s: &str) -> Result<u64, String> {
    let timeout: u64 = s.parse()
        .map_err(|_| "Timeout must be a number")?;

    if (10..=600).contains(&timeout) {
        Ok(timeout)
    } else {
        Err("Timeout must be between 10 and 600 seconds".to_string())
    }
}

fn validate_extract_timeout(s: &str) -> Result<u64, String> {
    let timeout: u64 = s.parse()
        .map_err(|_| "Extraction timeout must be a number")?;

    if (1..=3600).contains(&timeout) {
        Ok(timeout)
    } else {
        Err("Extraction timeout must be between 1 and 3600 seconds".to_string())
    }
}

fn validate_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) | Err(_) => Err("Value must be a positive integer".to_string()),
        Ok(n) => Ok(n),
    }
}
