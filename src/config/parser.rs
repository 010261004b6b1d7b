//! TOML parsing for engine configuration files.
//!
//! Reads a file, parses it with `toml`, and attaches the path to whichever step
//! failed so the report reads:
//!
//! ```text
//! Failed to parse config file: /etc/app/cobble.toml
//! Caused by:
//!     invalid type: string "yes", expected a boolean
//! ```

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a TOML file into any deserializable type.
///
/// # Arguments
///
/// * `path` - Path to the TOML file
///
/// # Returns
///
/// The deserialized value, or an error naming the file and the failing step
/// (read or parse) with the underlying I/O or TOML error as its cause.
///
/// # Examples
///
/// ```rust,no_run
/// use cobble::config::{parse_config, EngineConfig};
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let config: EngineConfig = parse_config(Path::new("cobble.toml"))?;
/// println!("strict: {}", config.strict_variables);
/// # Ok(())
/// # }
/// ```
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_parse_config_reads_engine_settings() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("cobble.toml");
        std::fs::write(
            &config_path,
            r#"
                strict_variables = true
                max_rendered_size = 4096

                [syntax]
                print_open = "<<"
                print_close = ">>"
            "#,
        )?;

        let config: EngineConfig = parse_config(&config_path)?;
        assert!(config.strict_variables);
        assert_eq!(config.max_rendered_size, 4096);
        assert_eq!(config.syntax.print_open, "<<");
        assert_eq!(config.syntax.execute_open, "{%", "unset delimiters keep defaults");
        Ok(())
    }

    #[test]
    fn test_parse_config_missing_file_names_path() {
        let result = parse_config::<EngineConfig>(Path::new("/nonexistent/cobble.toml"));
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Failed to read config file"), "got: {err}");
        assert!(err.contains("/nonexistent/cobble.toml"));
    }

    #[test]
    fn test_parse_config_invalid_toml() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("broken.toml");
        std::fs::write(&config_path, "strict_variables = \"yes\"")?;

        let result = parse_config::<EngineConfig>(&config_path);
        assert!(result.is_err());
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("Failed to parse config file"), "got: {message}");
        Ok(())
    }
}
