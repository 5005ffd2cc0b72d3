//! Layered client settings
//!
//! Built-in defaults, then the TOML file, then `PUBNUB_*` environment
//! variables, then command line flags.

use std::path::{Path, PathBuf};

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use pubnub::Config as ClientConfig;

/// Default settings file name inside the work dir
pub const CONFIG_FILE: &str = "config.toml";

/// Settings file used when none is given
pub fn default_config_file(work_dir: &Path) -> PathBuf {
    work_dir.join(CONFIG_FILE)
}

/// Load the client configuration
///
/// A missing settings file is not an error.
pub fn load(config_file: &Path) -> Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let settings = Config::builder()
        .add_source(Config::try_from(&defaults)?)
        .add_source(File::from(config_file).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("PUBNUB")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("origins")
                .try_parsing(true),
        )
        .build()?;

    let config: ClientConfig = settings.try_deserialize()?;
    tracing::debug!("Loaded settings from {}: {:?}", config_file.display(), config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config.origins, vec![pubnub::config::DEFAULT_ORIGIN]);
        assert_eq!(config.max_retries, ClientConfig::default().max_retries);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = default_config_file(dir.path());
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(
            file,
            r#"
subscribe_key = "sub-c-test"
origins = ["a.example", "b.example"]
heartbeat = 60
ssl = true
"#
        )
        .expect("write");

        let config = load(&path).expect("loaded");
        assert_eq!(config.subscribe_key, "sub-c-test");
        assert_eq!(config.origins, vec!["a.example", "b.example"]);
        assert_eq!(config.heartbeat, Some(60));
        assert!(config.ssl);
        assert_eq!(config.retries_interval, ClientConfig::default().retries_interval);
    }
}
