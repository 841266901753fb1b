//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the desks and servers.
//! Request handling never reads process-wide environment variables.

use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_REST_ADDR};
use crate::error::{WorkflowError, WorkflowResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    rest_addr: String,
}

impl CoreConfig {
    pub fn new(data_dir: PathBuf, rest_addr: String) -> WorkflowResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "data_dir cannot be empty".into(),
            ));
        }
        if rest_addr.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "rest_addr cannot be empty".into(),
            ));
        }

        Ok(Self {
            data_dir,
            rest_addr: rest_addr.trim().to_string(),
        })
    }

    /// Builds configuration from already-read environment values, applying defaults for blanks.
    ///
    /// Takes the values rather than reading them so tests do not depend on process state.
    pub fn from_env_values(
        data_dir: Option<String>,
        rest_addr: Option<String>,
    ) -> WorkflowResult<Self> {
        let data_dir = non_blank(data_dir).unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let rest_addr = non_blank(rest_addr).unwrap_or_else(|| DEFAULT_REST_ADDR.into());
        Self::new(PathBuf::from(data_dir), rest_addr)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    /// Fails unless the data directory exists. Binaries call this before serving.
    pub fn ensure_data_dir(&self) -> WorkflowResult<()> {
        if !self.data_dir.is_dir() {
            return Err(WorkflowError::InvalidInput(format!(
                "data directory does not exist: {}",
                self.data_dir.display()
            )));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = CoreConfig::from_env_values(Some("  ".into()), None).unwrap();
        assert_eq!(cfg.data_dir(), Path::new(DEFAULT_DATA_DIR));
        assert_eq!(cfg.rest_addr(), DEFAULT_REST_ADDR);
    }

    #[test]
    fn explicit_values_are_kept() {
        let cfg =
            CoreConfig::from_env_values(Some("/srv/sickbay".into()), Some("127.0.0.1:8080".into()))
                .unwrap();
        assert_eq!(cfg.data_dir(), Path::new("/srv/sickbay"));
        assert_eq!(cfg.rest_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn rejects_empty_address() {
        let err = CoreConfig::new(PathBuf::from("data"), " ".into()).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn ensure_data_dir_checks_existence() {
        let dir = TempDir::new().unwrap();
        let cfg = CoreConfig::new(dir.path().to_path_buf(), DEFAULT_REST_ADDR.into()).unwrap();
        assert!(cfg.ensure_data_dir().is_ok());

        let missing = CoreConfig::new(dir.path().join("missing"), DEFAULT_REST_ADDR.into()).unwrap();
        assert!(missing.ensure_data_dir().is_err());
    }
}
