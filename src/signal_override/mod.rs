use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Signal;

/// Directive read from the side-channel file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDirective {
    None,
    Long,
    Short,
}

impl OverrideDirective {
    /// Parse file content; tokens are case-sensitive, line breaks are ignored
    pub fn parse(content: &str) -> Self {
        let token: String = content.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        match token.as_str() {
            "LONG" => OverrideDirective::Long,
            "SHORT" => OverrideDirective::Short,
            _ => OverrideDirective::None,
        }
    }

    pub fn signal(self) -> Signal {
        match self {
            OverrideDirective::None => Signal::Flat,
            OverrideDirective::Long => Signal::Long,
            OverrideDirective::Short => Signal::Short,
        }
    }

    pub fn is_none(self) -> bool {
        self == OverrideDirective::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideConfig {
    #[serde(default = "default_override_path")]
    pub path: PathBuf,
    /// Override replaces the strategy signal; otherwise it only fills in when the strategy is flat
    #[serde(default = "default_take_precedence")]
    pub take_precedence: bool,
}

fn default_override_path() -> PathBuf {
    PathBuf::from("/tmp/sigbot_position")
}

fn default_take_precedence() -> bool {
    true
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            path: default_override_path(),
            take_precedence: default_take_precedence(),
        }
    }
}

/// Reads a LONG/SHORT directive from a file, ignoring it once stale
///
/// A directive is stale when the file was last modified before the
/// controller's last action on the market being evaluated.
#[derive(Debug, Clone)]
pub struct FileOverrideSource {
    path: PathBuf,
}

impl FileOverrideSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self, last_action: Option<DateTime<Utc>>) -> Result<OverrideDirective> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(OverrideDirective::None),
            Err(e) => return Err(e.into()),
        };

        let modified: DateTime<Utc> = metadata.modified()?.into();
        if let Some(last) = last_action {
            if last > modified {
                tracing::trace!(
                    path = %self.path.display(),
                    %modified,
                    %last,
                    "Override directive is stale"
                );
                return Ok(OverrideDirective::None);
            }
        }

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(OverrideDirective::None),
            Err(e) => return Err(e.into()),
        };

        Ok(OverrideDirective::parse(&content))
    }
}
