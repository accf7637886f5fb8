//! Environment Configuration Loader
//!
//! Loads `KEY=VALUE` files into the process environment and assembles the
//! service configuration from it.
//!
//! ## Variables
//!
//! ```bash
//! ENV=dev                         # dev: spawn the tool host over stdio
//! MCP_SERVER_SCRIPT=../../sid-mcp/build/index.js
//! MCP_SERVER_URL=https://tools.example.com/mcp
//! MCP_AUTH_TOKEN=ya29...          # fixed bearer token for the remote tool host
//! MCP_AUTH=google                 # without a fixed token: google (default) or none
//! GOOGLE_APPLICATION_CREDENTIALS=/path/to/key.json
//! GCE_METADATA_HOST=metadata.google.internal
//! ANTHROPIC_API_KEY=sk-ant-...
//! ANTHROPIC_MODEL=claude-3-5-sonnet-20241022
//! ANTHROPIC_MAX_TOKENS=1000
//! SID_MAX_TOOL_ROUNDS=5
//! SID_TOOL_FAILURE=degrade        # or abort
//! PORT=5051
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &[".env"];

pub const DEFAULT_PORT: u16 = 5051;
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;
pub const DEFAULT_SERVER_SCRIPT: &str = "../../sid-mcp/build/index.js";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Load environment variables from `SID_ENV_FILE` or `.env`.
///
/// Existing variables are never overridden. Returns the path that was loaded.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("SID_ENV_FILE") {
        if let Some(path) = load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Load one environment file; `None` when it is missing or unreadable.
pub fn load_env_file(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }

    match std::fs::read_to_string(path) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for (key, value) in content.lines().filter_map(parse_env_line) {
                if std::env::var(&key).is_err() {
                    std::env::set_var(&key, &value);
                    loaded_count += 1;
                    debug!("Loaded: {}={}", key, redact(&key, &value));
                } else {
                    skipped_count += 1;
                    debug!("Skipped (already set): {}", key);
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count,
                path.display(),
                skipped_count
            );
            Some(path.display().to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path.display(), e);
            None
        }
    }
}

fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    if key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET") {
        "***"
    } else {
        value
    }
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Where the tool host lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ToolHostTarget {
    /// Local subprocess speaking newline-delimited JSON-RPC
    Stdio { command: String, args: Vec<String> },
    /// Remote streamable-HTTP endpoint
    Http {
        url: String,
        #[serde(skip)]
        auth: ToolHostAuth,
    },
}

/// Credentials presented to a remote tool host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolHostAuth {
    #[default]
    None,
    /// Fixed bearer token
    Bearer(String),
    /// Google Application Default Credentials: a key file when one is
    /// configured, the compute metadata server otherwise.
    GoogleDefault {
        credentials_file: Option<PathBuf>,
        metadata_url: String,
    },
}

impl ToolHostAuth {
    /// Google credentials resolved from `GOOGLE_APPLICATION_CREDENTIALS`
    /// and `GCE_METADATA_HOST`.
    fn google_from_lookup<G>(get: &G) -> Self
    where
        G: Fn(&str) -> Option<String>,
    {
        let host = get("GCE_METADATA_HOST").unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        ToolHostAuth::GoogleDefault {
            credentials_file: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            metadata_url: format!("http://{}{}", host, METADATA_TOKEN_PATH),
        }
    }
}

impl ToolHostTarget {
    /// Pick the interpreter from the script extension (`.js` or `.py`).
    pub fn for_script(script: impl AsRef<Path>) -> Result<Self> {
        let script = script.as_ref();
        let command = match script.extension().and_then(|e| e.to_str()) {
            Some("js") => "node",
            Some("py") if cfg!(windows) => "python",
            Some("py") => "python3",
            _ => {
                return Err(Error::config(format!(
                    "Server script must be a .js or .py file: {}",
                    script.display()
                )))
            }
        };

        Ok(ToolHostTarget::Stdio {
            command: command.to_string(),
            args: vec![script.display().to_string()],
        })
    }
}

impl fmt::Display for ToolHostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolHostTarget::Stdio { command, args } => write!(f, "stdio:{} {}", command, args.join(" ")),
            ToolHostTarget::Http { url, .. } => write!(f, "{}", url),
        }
    }
}

/// What to do when a single tool call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFailurePolicy {
    /// Feed an error-shaped tool result back to the model and continue
    #[default]
    Degrade,
    /// Fail the whole run
    Abort,
}

impl FromStr for ToolFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "degrade" | "continue" => Ok(ToolFailurePolicy::Degrade),
            "abort" | "propagate" => Ok(ToolFailurePolicy::Abort),
            other => Err(Error::config(format!("Unknown tool failure policy: {}", other))),
        }
    }
}

/// Completion service settings
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub tool_host: ToolHostTarget,
    pub completion: CompletionSettings,
    pub max_tool_rounds: usize,
    pub tool_failure: ToolFailurePolicy,
    pub request_timeout: Duration,
    pub static_dir: PathBuf,
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_var(&get, "PORT", DEFAULT_PORT)?;

        let tool_host = if get("ENV").as_deref() == Some("dev") {
            let script = get("MCP_SERVER_SCRIPT").unwrap_or_else(|| DEFAULT_SERVER_SCRIPT.to_string());
            ToolHostTarget::for_script(script)?
        } else {
            let url = get("MCP_SERVER_URL")
                .ok_or_else(|| Error::config("MCP_SERVER_URL must be set when ENV is not 'dev'"))?;
            let auth = match (get("MCP_AUTH_TOKEN"), get("MCP_AUTH")) {
                (Some(token), _) => ToolHostAuth::Bearer(token),
                (None, None) => ToolHostAuth::google_from_lookup(&get),
                (None, Some(mode)) => match mode.to_lowercase().as_str() {
                    "google" => ToolHostAuth::google_from_lookup(&get),
                    "none" => ToolHostAuth::None,
                    other => return Err(Error::config(format!("Unknown MCP_AUTH mode: {}", other))),
                },
            };
            ToolHostTarget::Http { url, auth }
        };

        let completion = CompletionSettings {
            api_key: get("ANTHROPIC_API_KEY")
                .ok_or_else(|| Error::config("ANTHROPIC_API_KEY environment variable not set"))?,
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_var(&get, "ANTHROPIC_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            base_url: get("ANTHROPIC_BASE_URL"),
        };

        let max_tool_rounds = parse_var(&get, "SID_MAX_TOOL_ROUNDS", DEFAULT_MAX_TOOL_ROUNDS)?;
        let tool_failure = match get("SID_TOOL_FAILURE") {
            Some(v) => v.parse()?,
            None => ToolFailurePolicy::default(),
        };
        let timeout_secs: u64 = parse_var(&get, "SID_REQUEST_TIMEOUT_SECS", 120)?;

        Ok(Self {
            bind: SocketAddr::from(([0, 0, 0, 0], port)),
            tool_host,
            completion,
            max_tool_rounds,
            tool_failure,
            request_timeout: Duration::from_secs(timeout_secs),
            static_dir: PathBuf::from(get("SID_STATIC_DIR").unwrap_or_else(|| "dist".to_string())),
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted_and_exported() {
        assert_eq!(parse_env_line("FOO=\"bar baz\"").unwrap().1, "bar baz");
        assert_eq!(parse_env_line("FOO='bar'").unwrap().1, "bar");
        assert_eq!(parse_env_line("export FOO=bar").unwrap().0, "FOO");
        assert_eq!(parse_env_line("URL=http://x?a=b").unwrap().1, "http://x?a=b");
    }

    #[test]
    fn test_parse_env_line_skips_noise() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("# comment").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("NO_EQUALS").is_none());
    }

    #[test]
    fn test_load_env_file_does_not_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SID_TEST_CONFIG_NEW=from-file").unwrap();
        writeln!(file, "SID_TEST_CONFIG_SET=from-file").unwrap();
        std::env::set_var("SID_TEST_CONFIG_SET", "from-env");

        let loaded = load_env_file(file.path());

        assert!(loaded.is_some());
        assert_eq!(std::env::var("SID_TEST_CONFIG_NEW").unwrap(), "from-file");
        assert_eq!(std::env::var("SID_TEST_CONFIG_SET").unwrap(), "from-env");
        assert!(load_env_file("/nonexistent/sid.env").is_none());
    }

    #[test]
    fn test_dev_uses_stdio_script() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("ENV", "dev"),
            ("MCP_SERVER_SCRIPT", "tools/server.py"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .unwrap();

        let expected_cmd = if cfg!(windows) { "python" } else { "python3" };
        assert_eq!(
            config.tool_host,
            ToolHostTarget::Stdio {
                command: expected_cmd.into(),
                args: vec!["tools/server.py".into()],
            }
        );
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert_eq!(config.completion.model, DEFAULT_MODEL);
        assert_eq!(config.completion.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert_eq!(config.tool_failure, ToolFailurePolicy::Degrade);
    }

    #[test]
    fn test_remote_uses_http_with_token() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", "https://tools.example.com/mcp"),
            ("MCP_AUTH_TOKEN", "tok"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("SID_MAX_TOOL_ROUNDS", "1"),
            ("SID_TOOL_FAILURE", "abort"),
        ]))
        .unwrap();

        assert_eq!(
            config.tool_host,
            ToolHostTarget::Http {
                url: "https://tools.example.com/mcp".into(),
                auth: ToolHostAuth::Bearer("tok".into()),
            }
        );
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.max_tool_rounds, 1);
        assert_eq!(config.tool_failure, ToolFailurePolicy::Abort);
    }

    #[test]
    fn test_remote_without_token_uses_google_credentials() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", "https://tools.example.com/mcp"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(
            config.tool_host,
            ToolHostTarget::Http {
                url: "https://tools.example.com/mcp".into(),
                auth: ToolHostAuth::GoogleDefault {
                    credentials_file: None,
                    metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".into(),
                },
            }
        );

        let config = ServiceConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", "https://tools.example.com/mcp"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/sa.json"),
            ("GCE_METADATA_HOST", "127.0.0.1:8080"),
        ]))
        .unwrap();
        match config.tool_host {
            ToolHostTarget::Http {
                auth: ToolHostAuth::GoogleDefault { credentials_file, metadata_url },
                ..
            } => {
                assert_eq!(credentials_file, Some(PathBuf::from("/secrets/sa.json")));
                assert!(metadata_url.starts_with("http://127.0.0.1:8080/computeMetadata/"));
            }
            other => panic!("unexpected target: {:?}", other),
        }
    }

    #[test]
    fn test_remote_auth_can_be_disabled() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", "http://localhost:3000/mcp"),
            ("MCP_AUTH", "none"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert!(matches!(
            config.tool_host,
            ToolHostTarget::Http { auth: ToolHostAuth::None, .. }
        ));

        let bad = ServiceConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", "http://localhost:3000/mcp"),
            ("MCP_AUTH", "kerberos"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]));
        assert!(matches!(bad, Err(Error::Config(msg)) if msg.contains("MCP_AUTH")));
    }

    #[test]
    fn test_config_errors() {
        let missing_key = ServiceConfig::from_lookup(lookup(&[("ENV", "dev")]));
        assert!(matches!(missing_key, Err(Error::Config(_))));

        let missing_url = ServiceConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "k")]));
        assert!(matches!(missing_url, Err(Error::Config(_))));

        let bad_port = ServiceConfig::from_lookup(lookup(&[
            ("ENV", "dev"),
            ("ANTHROPIC_API_KEY", "k"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(bad_port, Err(Error::Config(msg)) if msg.contains("PORT")));

        assert!(ToolHostTarget::for_script("server.rb").is_err());
    }
}
