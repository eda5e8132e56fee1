use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default collector data directory: ~/.collector
pub fn get_collector_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".collector"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    expand_paths(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.collector/config.toml (highest)
    let user_config = get_collector_data_dir()
        .map(|dir| dir.join("config.toml"))
        .ok();

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = match user_config {
        Some(path) if path.exists() => {
            let s = std::fs::read_to_string(&path)?;
            toml::from_str::<AppConfig>(&s)?
        }
        _ if local_config.exists() => {
            let s = std::fs::read_to_string(local_config)?;
            toml::from_str::<AppConfig>(&s)?
        }
        _ => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg);
    expand_paths(&mut cfg);
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) {
    let read = |name: &str| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
    };

    if let Some(v) = read("COLLECTOR_STORAGE_DIR") {
        cfg.storage.directory = v;
    }
    if let Some(v) = read("COLLECTOR_API_BASE_URL") {
        cfg.sync.base_url = v;
    }
    if let Some(v) = read("COLLECTOR_API_KEY") {
        cfg.sync.api_key = v;
    }
    if let Some(v) = read("COLLECTOR_ACCOUNT_ID") {
        cfg.sync.account_id = v;
    }
}

fn expand_paths(cfg: &mut AppConfig) {
    cfg.storage.directory = shellexpand::tilde(&cfg.storage.directory).to_string();
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = shellexpand::tilde(dir.as_str()).to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ndirectory = \"/var/lib/collector\"\nflush_threshold = 7\n",
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.storage.flush_threshold, 7);
    }

    #[test]
    fn load_from_path_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "storage = [").unwrap();
        assert!(load_from_path(&path).is_err());
    }
}
