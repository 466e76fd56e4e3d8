//! Live OBD Monitor
//!
//! Loads configuration, starts a polling session and prints one JSON line
//! per snapshot until interrupted or the connection is lost.

use config::{Config, Environment, File, FileFormat};
use obd_poller::{ObdSession, SessionConfig};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Config file read when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "obd-monitor.toml";

/// Prefix of environment overrides, e.g. `OBD_MONITOR_SESSION__HOST`
pub const ENV_PREFIX: &str = "OBD_MONITOR";

/// Monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Failed to install logger: {0}")]
    Logging(String),

    #[error("Could not connect to the OBD adapter")]
    InitFailed,

    #[error("OBD connection lost")]
    ConnectionLost,

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub session: SessionConfig,
    /// Pause between two snapshot reads (ms)
    pub read_interval_ms: u64,
    /// Whether the adapter's Wi-Fi network is up
    pub adapter_reachable: bool,
    /// Max log level (`trace` to `error`)
    pub log_level: String,
    /// Emit logs as JSON
    pub json_logs: bool,
}

impl MonitorConfig {
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            read_interval_ms: 500,
            adapter_reachable: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Load configuration from an optional TOML file and the environment
pub fn load_config(path: Option<&str>) -> Result<MonitorConfig, MonitorError> {
    load_config_with_env(path, env_overrides())
}

/// `OBD_MONITOR_*` variables, `__` separating nested keys
fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_config_with_env(
    path: Option<&str>,
    env: Environment,
) -> Result<MonitorConfig, MonitorError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let config = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(false))
        .add_source(env)
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Parse configuration from TOML text, without environment overrides
pub fn load_config_from_str(toml: &str) -> Result<MonitorConfig, MonitorError> {
    let config = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Initialize logging to stderr, keeping stdout for readings
pub fn init_logging(level: &str, json: bool) -> Result<(), MonitorError> {
    let level: Level = level
        .parse()
        .map_err(|_| MonitorError::InvalidLogLevel(level.to_string()))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| MonitorError::Logging(e.to_string()))
}

/// Print a snapshot every `interval` until `shutdown` resolves
///
/// Returns the number of lines written, or [`MonitorError::ConnectionLost`]
/// once the session stops serving snapshots.
pub async fn print_snapshots<W, F>(
    session: &ObdSession,
    interval: Duration,
    out: &mut W,
    shutdown: F,
) -> Result<usize, MonitorError>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    let mut printed = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested after {} snapshots", printed);
                return Ok(printed);
            }
            _ = ticker.tick() => {
                let Some(snapshot) = session.read_snapshot() else {
                    warn!("No connection to the OBD adapter (state {:?})", session.state());
                    return Err(MonitorError::ConnectionLost);
                };
                let line = serde_json::to_string(&snapshot.to_legacy_map())?;
                writeln!(out, "{}", line)?;
                out.flush()?;
                printed += 1;
            }
        }
    }
}

/// Run the monitor until Ctrl-C or connection loss
pub async fn run(config: MonitorConfig) -> Result<(), MonitorError> {
    let mut session = ObdSession::new(config.session.clone());
    if !session.init(config.adapter_reachable).await {
        return Err(MonitorError::InitFailed);
    }

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = std::io::stdout();
    let printed = print_snapshots(&session, config.read_interval(), &mut stdout, ctrl_c).await;

    if let Err(e) = session.shutdown().await {
        warn!("Polling ended with an error: {}", e);
    }

    printed.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::{AdapterScript, MockAdapter, Reply};
    use std::collections::BTreeMap;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.read_interval(), Duration::from_millis(500));
        assert!(config.adapter_reachable);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.session.port, 35000);
    }

    #[test]
    fn test_config_from_toml() {
        let config = load_config_from_str(
            r#"
read_interval_ms = 250
json_logs = true

[session]
host = "10.0.0.5"
port = 23
"#,
        )
        .unwrap();

        assert_eq!(config.read_interval_ms, 250);
        assert!(config.json_logs);
        assert_eq!(config.session.host, "10.0.0.5");
        assert_eq!(config.session.port, 23);
        assert_eq!(config.session.sweep_interval_ms, 100);
        assert_eq!(config.log_level, "info");
    }

    const MISSING_FILE: &str = "/nonexistent/obd-monitor.toml";

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_overrides().source(Some(map))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config_with_env(Some(MISSING_FILE), env_with(&[])).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env = env_with(&[
            ("OBD_MONITOR_SESSION__PORT", "35001"),
            ("OBD_MONITOR_READ_INTERVAL_MS", "250"),
            ("OBD_MONITOR_JSON_LOGS", "true"),
            ("OTHER_SESSION__PORT", "1"),
        ]);
        let config = load_config_with_env(Some(MISSING_FILE), env).unwrap();

        assert_eq!(config.session.port, 35001);
        assert_eq!(config.read_interval_ms, 250);
        assert!(config.json_logs);
        assert_eq!(config.session.host, "192.168.0.10");
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(matches!(
            init_logging("loud", false),
            Err(MonitorError::InvalidLogLevel(_))
        ));
    }

    #[tokio::test]
    async fn test_prints_json_lines() {
        let script = AdapterScript::new().on("010D", Reply::text("41 0D 32\r\n\r\n>"));
        let adapter = MockAdapter::start(script).await.unwrap();
        let mut session = ObdSession::new(SessionConfig {
            host: adapter.host(),
            port: adapter.port(),
            response_delay_ms: 0,
            sweep_interval_ms: 5,
            ..SessionConfig::default()
        });
        session.start(true).await.unwrap();

        let mut out = Vec::new();
        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let printed = print_snapshots(&session, Duration::from_millis(20), &mut out, shutdown)
            .await
            .unwrap();
        session.shutdown().await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(printed > 0);
        assert_eq!(lines.len(), printed);
        for line in lines {
            let map: BTreeMap<String, String> = serde_json::from_str(line).unwrap();
            assert_eq!(map.len(), 13);
            assert!(map.contains_key("vin"));
        }
    }

    #[tokio::test]
    async fn test_stops_without_connection() {
        let session = ObdSession::new(SessionConfig::default());
        let mut out = Vec::new();

        let result = print_snapshots(
            &session,
            Duration::from_millis(10),
            &mut out,
            std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(MonitorError::ConnectionLost)));
        assert!(out.is_empty());
    }
}
