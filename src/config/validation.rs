use super::{AppConfig, MAX_HANDLER_TIMEOUT_MS, MIN_HANDLER_TIMEOUT_MS};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{env, fs, path::PathBuf};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if self.command.is_empty() || self.command[0].is_empty() {
            bail!("a child command is required");
        }
        if self.term_value.is_empty() {
            bail!("--term must not be empty");
        }
        if !(MIN_HANDLER_TIMEOUT_MS..=MAX_HANDLER_TIMEOUT_MS).contains(&self.handler_timeout_ms) {
            bail!(
                "--handler-timeout-ms must be between {MIN_HANDLER_TIMEOUT_MS} and \
                 {MAX_HANDLER_TIMEOUT_MS}, got {}",
                self.handler_timeout_ms
            );
        }

        let cwd = fs::canonicalize(&self.cwd)
            .with_context(|| format!("--cwd does not resolve: {}", self.cwd))?;
        if !cwd.is_dir() {
            bail!("--cwd is not a directory: {}", self.cwd);
        }
        self.cwd = cwd.display().to_string();

        // Fail on malformed --env pairs now rather than mid-session.
        self.env_pairs()?;
        Ok(())
    }

    /// Parsed `--env KEY=VALUE` pairs.
    pub fn env_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::with_capacity(self.envs.len());
        for raw in &self.envs {
            let Some((key, value)) = raw.split_once('=') else {
                bail!("--env must look like KEY=VALUE, got: {raw}");
            };
            if key.is_empty() {
                bail!("--env key must not be empty, got: {raw}");
            }
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(pairs)
    }

    /// Where the default spool handler drops pasted images.
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("pastebridge_spool"))
    }
}
