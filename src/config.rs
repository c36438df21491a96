use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("the DDL script does not exist or is not specified (CREATE_QUERY={0:?})")]
    DdlNotFound(Option<PathBuf>),
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub upload_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub database_path: PathBuf,
    pub ddl_path: PathBuf,
    pub chart_font: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let ddl_path = lookup("CREATE_QUERY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let ddl_path = match ddl_path {
            Some(path) if path.is_file() => path,
            other => return Err(ConfigError::DdlNotFound(other)),
        };

        Ok(Config {
            upload_dir: PathBuf::from(value("UPLOAD_DIR", "uploads")),
            plot_dir: PathBuf::from(value("PLOT_DIR", "plots")),
            server_host: value("SERVER_HOST", "127.0.0.1"),
            server_port: parse_port(&value("SERVER_PORT", "8000"))?,
            database_path: PathBuf::from(value("DATABASE_PATH", "costsheet.db")),
            ddl_path,
            chart_font: lookup("CHART_FONT")
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(v.trim())),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn prepare_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.upload_dir)?;
        fs::create_dir_all(&self.plot_dir)
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|err| ConfigError::Invalid {
        key: "SERVER_PORT",
        value: value.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ddl = dir.path().join("schema.sql");
        fs::write(&ddl, "")?;
        let ddl_var = ddl.to_string_lossy().to_string();

        let config = Config::from_lookup(lookup(&[("CREATE_QUERY", ddl_var.as_str())]))?;
        assert_eq!(
            config,
            Config {
                upload_dir: PathBuf::from("uploads"),
                plot_dir: PathBuf::from("plots"),
                server_host: "127.0.0.1".to_string(),
                server_port: 8000,
                database_path: PathBuf::from("costsheet.db"),
                ddl_path: ddl,
                chart_font: None,
            }
        );
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");

        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ddl = dir.path().join("schema.sql");
        fs::write(&ddl, "")?;
        let ddl_var = ddl.to_string_lossy().to_string();

        let config = Config::from_lookup(lookup(&[
            ("CREATE_QUERY", ddl_var.as_str()),
            ("UPLOAD_DIR", "/srv/in"),
            ("PLOT_DIR", "/srv/out"),
            ("SERVER_HOST", "0.0.0.0"),
            ("SERVER_PORT", "0080"),
            ("DATABASE_PATH", "/srv/costs.db"),
            ("CHART_FONT", "/usr/share/fonts/dejavu.ttf"),
        ]))?;

        assert_eq!(config.bind_addr(), "0.0.0.0:80");
        assert_eq!(config.upload_dir, PathBuf::from("/srv/in"));
        assert_eq!(config.chart_font, Some(PathBuf::from("/usr/share/fonts/dejavu.ttf")));

        Ok(())
    }

    #[test]
    fn test_missing_ddl() {
        assert_eq!(Config::from_lookup(lookup(&[])), Err(ConfigError::DdlNotFound(None)));
        assert_eq!(
            Config::from_lookup(lookup(&[("CREATE_QUERY", "/nonexistent/schema.sql")])),
            Err(ConfigError::DdlNotFound(Some(PathBuf::from("/nonexistent/schema.sql"))))
        );
    }

    #[test]
    fn test_invalid_port() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ddl = dir.path().join("schema.sql");
        fs::write(&ddl, "")?;
        let ddl_var = ddl.to_string_lossy().to_string();

        let result = Config::from_lookup(lookup(&[("CREATE_QUERY", ddl_var.as_str()), ("SERVER_PORT", "http")]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "SERVER_PORT", .. })));

        Ok(())
    }
}
