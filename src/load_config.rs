/// `load_config` module: Loads a static YAML build config and injects the CMS access token from the environment.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`]
/// - Read the secret access token from `CONTENTFUL_ACCESS_TOKEN`, never from the file
/// - Produce clear diagnostics for CLI and tests when the file is missing or malformed
///
/// A missing token is not an error here: the plugin itself rejects it when it is
/// constructed, before any file is processed.
///
/// # Accepted YAML
/// ```yaml
/// source: ./site
/// destination: ./build
/// contentful:
///   host: https://cdn.contentful.com   # optional
///   concurrency: 8                     # optional, unbounded when absent
/// ```
use anyhow::Result;
use cms_pages_core::PluginOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Environment variable holding the Delivery API access token.
pub const ACCESS_TOKEN_ENV: &str = "CONTENTFUL_ACCESS_TOKEN";

#[derive(Debug)]
pub struct CliConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub plugin: PluginOptions,
}

#[derive(Debug, Default, Deserialize)]
struct ContentfulSection {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    source: PathBuf,
    destination: PathBuf,
    #[serde(default)]
    contentful: ContentfulSection,
}

/// Loads a static YAML config file (no secrets) and injects the access token from env.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let access_token = match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) => {
            info!("{ACCESS_TOKEN_ENV} found in env");
            Some(token)
        }
        Err(e) => {
            warn!(error = ?e, "{ACCESS_TOKEN_ENV} environment variable not set");
            None
        }
    };

    let plugin = PluginOptions {
        access_token,
        host: raw.contentful.host,
        concurrency: raw.contentful.concurrency,
    };

    info!(
        source = %raw.source.display(),
        destination = %raw.destination.display(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        source: raw.source,
        destination: raw.destination,
        plugin,
    })
}
