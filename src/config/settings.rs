use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Web server settings
    pub server: ServerSettings,
    /// Sandbox container settings
    pub sandbox: SandboxSettings,
    /// Replay orchestration settings
    pub replay: ReplaySettings,
}

/// Web server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable permissive CORS (allows any origin; development default)
    pub cors_permissive: bool,
    /// Largest accepted capture upload, in mebibytes
    pub max_upload_mb: usize,
}

/// How to reach the sandbox container
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Name of the already-running container that receives replay traffic
    pub container_name: String,
    /// Explicit docker binary path (None = resolve from PATH)
    pub docker_bin: Option<PathBuf>,
    /// Directory inside the sandbox for per-task files
    pub remote_dir: String,
    /// Timeout for synchronous exec calls (status reads, cleanup)
    pub exec_timeout_secs: u64,
    /// Timeout for file transfers into the sandbox
    pub upload_timeout_secs: u64,
}

/// Replay orchestration settings
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    /// Supervisor poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Watchdog window: maximum runner silence between status reads
    pub watchdog_secs: u64,
    /// In-sandbox format conversion timeout
    pub convert_timeout_secs: u64,
    /// In-sandbox address rewrite timeout
    pub rewrite_timeout_secs: u64,
    /// Speed multiplier used when a start request does not specify one
    pub default_speed: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_permissive: true,
                max_upload_mb: 512,
            },
            sandbox: SandboxSettings {
                container_name: "recast-sandbox".to_string(),
                docker_bin: None,
                remote_dir: "/tmp".to_string(),
                exec_timeout_secs: 10,
                upload_timeout_secs: 60,
            },
            replay: ReplaySettings {
                poll_interval_ms: 500,
                watchdog_secs: 20,
                convert_timeout_secs: 120,
                rewrite_timeout_secs: 120,
                default_speed: 1.0,
            },
        }
    }
}

/// TOML representation of server settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_permissive: Option<bool>,
    pub max_upload_mb: Option<usize>,
}

/// TOML representation of sandbox settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSandboxSettings {
    pub container_name: Option<String>,
    pub docker_bin: Option<PathBuf>,
    pub remote_dir: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
}

/// TOML representation of replay settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlReplaySettings {
    pub poll_interval_ms: Option<u64>,
    pub watchdog_secs: Option<u64>,
    pub convert_timeout_secs: Option<u64>,
    pub rewrite_timeout_secs: Option<u64>,
    pub default_speed: Option<f64>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub server: Option<TomlServerSettings>,
    pub sandbox: Option<TomlSandboxSettings>,
    pub replay: Option<TomlReplaySettings>,
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let mut config = Config::default();

        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        if config_file.exists() {
            match fs::read_to_string(&config_file) {
                Ok(contents) => match toml::from_str::<TomlConfig>(&contents) {
                    Ok(toml_config) => config.merge(toml_config),
                    Err(e) => {
                        tracing::warn!(path = %config_file.display(), error = %e, "Ignoring unparseable config file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %config_file.display(), error = %e, "Failed to read config file");
                }
            }
        }

        config
    }

    /// Merge optional TOML values over the current configuration
    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(server) = toml_config.server {
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(cors) = server.cors_permissive {
                self.server.cors_permissive = cors;
            }
            if let Some(mb) = server.max_upload_mb {
                self.server.max_upload_mb = mb;
            }
        }

        if let Some(sandbox) = toml_config.sandbox {
            if let Some(name) = sandbox.container_name {
                self.sandbox.container_name = name;
            }
            if sandbox.docker_bin.is_some() {
                self.sandbox.docker_bin = sandbox.docker_bin;
            }
            if let Some(dir) = sandbox.remote_dir {
                self.sandbox.remote_dir = dir;
            }
            if let Some(secs) = sandbox.exec_timeout_secs {
                self.sandbox.exec_timeout_secs = secs;
            }
            if let Some(secs) = sandbox.upload_timeout_secs {
                self.sandbox.upload_timeout_secs = secs;
            }
        }

        if let Some(replay) = toml_config.replay {
            if let Some(ms) = replay.poll_interval_ms {
                self.replay.poll_interval_ms = ms;
            }
            if let Some(secs) = replay.watchdog_secs {
                self.replay.watchdog_secs = secs;
            }
            if let Some(secs) = replay.convert_timeout_secs {
                self.replay.convert_timeout_secs = secs;
            }
            if let Some(secs) = replay.rewrite_timeout_secs {
                self.replay.rewrite_timeout_secs = secs;
            }
            if let Some(speed) = replay.default_speed {
                self.replay.default_speed = speed;
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &PathBuf) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        // Write the example config
        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }
}
