mod settings;

pub use settings::{Config, ReplaySettings, SandboxSettings, ServerSettings, TomlConfig};
