use std::path::PathBuf;

use apex_core::context::{DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE};

use crate::error::AgentError;

/// Deployment environment. Decides the file source and the patch sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, AgentError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(AgentError::Config(format!(
                "APP_ENV must be 'development' or 'production', got '{other}'"
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Repository targeted by remote reads and direct commits.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Context gathering budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub max_files: usize,
    pub max_file_size: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub environment: Environment,
    pub openai: OpenAiConfig,
    /// Present only when a token, owner and repo are all configured.
    pub github: Option<GithubConfig>,
    pub project_root: PathBuf,
    pub context: ContextLimits,
    /// Program and arguments of the development type-check; `None` disables it.
    pub type_check_command: Option<Vec<String>>,
    pub git_auto_commit: bool,
    pub git_auto_push: bool,
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                      |
    /// |-------------------------|------------------------------|
    /// | `APP_ENV`               | `development`                |
    /// | `OPENAI_API_KEY`        | required                     |
    /// | `OPENAI_BASE_URL`       | `https://api.openai.com/v1`  |
    /// | `OPENAI_MODEL`          | `gpt-4o`                     |
    /// | `GITHUB_TOKEN`          | unset                        |
    /// | `GITHUB_API_URL`        | `https://api.github.com`     |
    /// | `GITHUB_OWNER`          | unset                        |
    /// | `GITHUB_REPO`           | unset                        |
    /// | `GITHUB_BRANCH`         | `main`                       |
    /// | `PROJECT_ROOT`          | `.`                          |
    /// | `CONTEXT_MAX_FILES`     | `15`                         |
    /// | `CONTEXT_MAX_FILE_SIZE` | `50000`                      |
    /// | `TYPE_CHECK_COMMAND`    | `npx tsc --noEmit`           |
    /// | `GIT_AUTO_COMMIT`       | `false`                      |
    /// | `GIT_AUTO_PUSH`         | `false`                      |
    pub fn from_env() -> Result<Self, AgentError> {
        let environment = Environment::parse(&env_or("APP_ENV", "development"))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Config("OPENAI_API_KEY must be set".into()))?;
        let openai = OpenAiConfig {
            api_key,
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("OPENAI_MODEL", "gpt-4o"),
        };

        let github = match (
            non_empty_var("GITHUB_TOKEN"),
            non_empty_var("GITHUB_OWNER"),
            non_empty_var("GITHUB_REPO"),
        ) {
            (Some(token), Some(owner), Some(repo)) => Some(GithubConfig {
                token,
                api_url: env_or("GITHUB_API_URL", "https://api.github.com"),
                owner,
                repo,
                branch: env_or("GITHUB_BRANCH", "main"),
            }),
            (Some(_), _, _) => {
                tracing::warn!("GITHUB_TOKEN is set but GITHUB_OWNER/GITHUB_REPO are not; remote access disabled");
                None
            }
            _ => None,
        };

        let context = ContextLimits {
            max_files: parse_var("CONTEXT_MAX_FILES", DEFAULT_MAX_FILES)?,
            max_file_size: parse_var("CONTEXT_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
        };

        Ok(Self {
            environment,
            openai,
            github,
            project_root: PathBuf::from(env_or("PROJECT_ROOT", ".")),
            context,
            type_check_command: parse_command(&env_or("TYPE_CHECK_COMMAND", "npx tsc --noEmit")),
            git_auto_commit: parse_var("GIT_AUTO_COMMIT", false)?,
            git_auto_push: parse_var("GIT_AUTO_PUSH", false)?,
        })
    }

    /// Commit straight to the remote repository instead of writing locally.
    pub fn uses_remote_sink(&self) -> bool {
        self.environment.is_production() && self.github.is_some()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AgentError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{key} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

/// Split a command line on whitespace; an empty line disables the command.
pub fn parse_command(line: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    (!parts.is_empty()).then_some(parts)
}
