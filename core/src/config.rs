/// Configuration management
use crate::aggregator::{DEFAULT_FEED_SIZE, DEFAULT_LOG_CAPACITY};
use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Query API port used when neither a flag nor the environment sets one
pub const DEFAULT_API_PORT: u16 = 9470;
const DEFAULT_BRIDGE_PORT: u16 = 9999;

const USAGE_FLAGS: &str = "[--api-port <port>] [--bridge-port <port>] [--load <path>] [--demo] \
    [--seed <n>] [--log-capacity <n>] [--feed-size <n>]";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Query API address for local clients
    pub api_addr: SocketAddr,

    /// UDP address the bridge listens on
    pub bridge_addr: SocketAddr,

    /// File holding messages buffered by the extension
    pub buffered_path: Option<PathBuf>,

    /// Delay before the buffered file is read
    pub load_delay: Duration,

    /// Delay before reporting that nothing has arrived yet
    pub prompt_delay: Duration,

    /// Start the demo generator on launch
    pub demo: bool,

    /// Shortest pause between demo messages
    pub demo_min_interval: Duration,

    /// Random extra pause added on top of `demo_min_interval`
    pub demo_jitter: Duration,

    /// Seed for the demo generator (random when unset)
    pub seed: Option<u64>,

    /// Capacity of the message log
    pub log_capacity: usize,

    /// Number of messages in the recent feed
    pub feed_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            bridge_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_BRIDGE_PORT)),
            buffered_path: None,
            load_delay: Duration::from_millis(500),
            prompt_delay: Duration::from_secs(3),
            demo: false,
            demo_min_interval: Duration::from_millis(800),
            demo_jitter: Duration::from_millis(1500),
            seed: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
            feed_size: DEFAULT_FEED_SIZE,
        }
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| FlowError::Config(format!("{} requires an argument", flag)))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| FlowError::Config(format!("{} must be a valid number", flag)))
}

fn env_port(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|s| s.parse::<u16>().ok())
}

impl Config {
    /// Create config from command line arguments.
    ///
    /// `args[0]` is the program name. Environment variables override flags.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();
        let mut api_port: Option<u16> = None;
        let mut bridge_port: Option<u16> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api-port" => {
                    api_port =
                        Some(parse_number(flag_value(args, i, "--api-port")?, "--api-port")?);
                    i += 2;
                }
                "--bridge-port" => {
                    bridge_port = Some(parse_number(
                        flag_value(args, i, "--bridge-port")?,
                        "--bridge-port",
                    )?);
                    i += 2;
                }
                "--load" => {
                    config.buffered_path = Some(PathBuf::from(flag_value(args, i, "--load")?));
                    i += 2;
                }
                "--demo" => {
                    config.demo = true;
                    i += 1;
                }
                "--seed" => {
                    config.seed = Some(parse_number(flag_value(args, i, "--seed")?, "--seed")?);
                    i += 2;
                }
                "--log-capacity" => {
                    let capacity: usize =
                        parse_number(flag_value(args, i, "--log-capacity")?, "--log-capacity")?;
                    if capacity == 0 {
                        return Err(FlowError::Config(
                            "--log-capacity must be at least 1".to_string(),
                        ));
                    }
                    config.log_capacity = capacity;
                    i += 2;
                }
                "--feed-size" => {
                    config.feed_size =
                        parse_number(flag_value(args, i, "--feed-size")?, "--feed-size")?;
                    i += 2;
                }
                other => {
                    return Err(FlowError::Config(format!(
                        "Unknown argument: {}\nUsage: {} {}",
                        other,
                        args.first().map(|s| s.as_str()).unwrap_or("chatflow"),
                        USAGE_FLAGS
                    )));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(p) = env_port("CHATFLOW_API_PORT") {
            api_port = Some(p);
        }
        if let Some(p) = env_port("CHATFLOW_BRIDGE_PORT") {
            bridge_port = Some(p);
        }
        if let Ok(path) = std::env::var("CHATFLOW_LOAD") {
            config.buffered_path = Some(PathBuf::from(path));
        }
        if std::env::var("CHATFLOW_DEMO").is_ok() {
            config.demo = true;
        }

        if let Some(p) = api_port {
            config.api_addr.set_port(p);
        }
        if let Some(p) = bridge_port {
            config.bridge_addr.set_port(p);
        }

        Ok(config)
    }
}
