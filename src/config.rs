use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub registry: RegistryConfig,
  /// Locale for user-facing messages (overridable on the command line).
  pub default_lang: Option<String>,
  #[serde(default)]
  pub offline: OfflineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
  /// Registry base URL; `/api/v1` is appended when missing.
  pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineConfig {
  /// Paths prefetched into the static response cache when the fetch gate
  /// starts (e.g. "/", "/logo.webp").
  #[serde(default)]
  pub prefetch: Vec<String>,
  /// Override for the store/cache/log location (defaults to the platform
  /// data directory).
  pub data_dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./marq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/marq/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/marq/config.yaml\n\
                 with at least a registry.url entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("marq.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("marq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the registry API key from environment variables.
  ///
  /// Checks MARQ_API_KEY first, then BRAND_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("MARQ_API_KEY")
      .or_else(|_| std::env::var("BRAND_API_KEY"))
      .map_err(|_| {
        eyre!("Registry API key not found. Set MARQ_API_KEY or BRAND_API_KEY environment variable.")
      })
  }

  /// Registry API base, normalized to end in `/api/v1`.
  pub fn api_base(&self) -> Result<Url> {
    normalize_api_base(&self.registry.url)
  }

  /// Site origin the fetch gate resolves raw paths against.
  pub fn origin(&self) -> Result<Url> {
    let base = self.api_base()?;
    let origin = base
      .as_str()
      .trim_end_matches('/')
      .trim_end_matches("/api/v1")
      .to_string();
    origin
      .parse()
      .map_err(|e| eyre!("Invalid registry url {}: {}", self.registry.url, e))
  }

  /// Directory holding the brand store, response cache and log file.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.offline.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("marq"))
  }
}

fn normalize_api_base(raw: &str) -> Result<Url> {
  let trimmed = raw.trim().trim_end_matches('/');
  if trimmed.is_empty() {
    return Err(eyre!("registry.url must not be empty"));
  }

  let base = if trimmed.ends_with("/api/v1") {
    trimmed.to_string()
  } else {
    format!("{trimmed}/api/v1")
  };

  base
    .parse()
    .map_err(|e| eyre!("Invalid registry url {}: {}", raw, e))
}
