use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::actions::Action;

pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:1235/v1/chat/completions";
pub const DEFAULT_INFERENCE_MODEL: &str = "huihui-qwen3-vl-2b-instruct-abliterated";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You control a computer by looking at a screenshot. Previous actions are marked on it.
You can ONLY use these functions, one call per line:

click(x, y)
right_click(x, y)
double_click(x, y)
drag(x1, y1, x2, y2)
write(\"text\")
remember(\"text\")
recall()

Rules:
- Reply with a short report (2-4 sentences), then the function calls.
- Always give at least two actions.
- Coordinates are 0-1000 on both axes.
";

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the operator API binds to
    pub host: IpAddr,
    pub port: u16,
    /// Parent directory for per-run directories
    pub run_base: PathBuf,
    /// Operator panel page served at `/`
    pub panel_html: PathBuf,
    pub turn: TurnConfig,
    /// Keep-alive interval on the event feed
    pub sse_keepalive: Duration,
    pub executor: ExecutorConfig,
    pub inference: InferenceConfig,
}

/// Knobs of the control loop.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Context sent with the very first turn
    pub initial_context: String,
    pub annotation_timeout: Duration,
    /// Pause between turns
    pub throttle: Duration,
    /// Padding used when inference proposes too few actions
    pub fallback_action: Action,
    pub min_actions: usize,
    /// Upper bound on one execution call
    pub executor_timeout: Duration,
    /// Upper bound on one inference attempt
    pub inference_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            initial_context: "hi".to_string(),
            annotation_timeout: Duration::from_secs(30),
            throttle: Duration::from_millis(1500),
            fallback_action: Action::Click { x: 500, y: 500 },
            min_actions: 2,
            executor_timeout: Duration::from_secs(120),
            inference_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INFERENCE_URL.to_string(),
            model: DEFAULT_INFERENCE_MODEL.to_string(),
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1000,
            timeout: Duration::from_secs(90),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let fallback_raw = env_str("FALLBACK_ACTION", "click(500, 500)");
        let fallback_action = fallback_raw
            .parse::<Action>()
            .map_err(|e| anyhow::anyhow!("Invalid FALLBACK_ACTION '{fallback_raw}': {e}"))?;

        let min_actions: usize = env_parse("MIN_ACTIONS_PER_TURN", 2)?;
        let executor_timeout = Duration::from_secs(env_parse("EXECUTOR_TIMEOUT_SECS", 120)?);
        let inference_timeout = Duration::from_secs(env_parse("INFERENCE_TIMEOUT_SECS", 90)?);

        Ok(Self {
            host: env_parse("ENGINE_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: env_parse("ENGINE_PORT", 1234)?,
            run_base: PathBuf::from(env_str("ENGINE_RUN_BASE", "panel_log")),
            panel_html: PathBuf::from(env_str("ENGINE_PANEL_HTML", "panel.html")),
            turn: TurnConfig {
                initial_context: env_str("ENGINE_INITIAL_CONTEXT", "hi"),
                annotation_timeout: Duration::from_secs(env_parse("ANNOTATION_TIMEOUT_SECS", 30)?),
                throttle: Duration::from_millis(env_parse("TURN_THROTTLE_MS", 1500)?),
                fallback_action,
                min_actions,
                executor_timeout,
                inference_timeout,
            },
            sse_keepalive: Duration::from_secs(env_parse::<u64>("SSE_KEEPALIVE_SECS", 10)?.max(1)),
            executor: ExecutorConfig {
                program: env_str("EXECUTOR_PROGRAM", "python"),
                args: env_csv("EXECUTOR_ARGS", &["executor.py"]),
                timeout: executor_timeout,
            },
            inference: InferenceConfig {
                url: env_str("INFERENCE_URL", DEFAULT_INFERENCE_URL),
                model: env_str("INFERENCE_MODEL", DEFAULT_INFERENCE_MODEL),
                api_key: std::env::var("INFERENCE_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                system_prompt: env_str("INFERENCE_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
                temperature: env_parse("INFERENCE_TEMPERATURE", 0.7)?,
                top_p: env_parse("INFERENCE_TOP_P", 0.9)?,
                max_tokens: env_parse("INFERENCE_MAX_TOKENS", 1000)?,
                timeout: inference_timeout,
            },
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
