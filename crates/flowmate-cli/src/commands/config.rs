//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use flowmate_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "base_url": config.base_url,
                    "resolve_timeout_secs": config.resolve_timeout_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  base_url:             {}", config.base_url);
            println!("  resolve_timeout_secs: {}", config.resolve_timeout_secs);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set_value(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    fn config_in(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("config.toml");
        let data_dir = temp.path().join("data");
        std::fs::write(&path, format!("data_dir = {:?}\n", data_dir)).unwrap();
        path
    }

    #[test]
    fn test_set_writes_to_cli_path() {
        let temp = TempDir::new().unwrap();
        let path = config_in(&temp);

        set(
            "base_url".to_string(),
            "https://notes.example.org/".to_string(),
            Some(&path),
            &quiet(),
        )
        .unwrap();

        let saved = Config::load_from_path(&path).unwrap();
        assert_eq!(saved.base_url, "https://notes.example.org/");
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let temp = TempDir::new().unwrap();
        let path = config_in(&temp);
        let before = std::fs::read_to_string(&path).unwrap();

        let err = set("theme".to_string(), "dark".to_string(), Some(&path), &quiet());
        assert!(err.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
