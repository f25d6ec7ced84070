//! Report Writer
//!
//! Renders the per-name report as YAML or JSON for stdout.

use crate::domain::entities::Report;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("yaml encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders reports with names in sorted order.
pub struct ReportWriter {
    format: OutputFormat,
    pretty: bool,
}

impl ReportWriter {
    /// `pretty` only affects JSON; YAML is always block style.
    pub fn new(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }

    pub fn render(&self, reports: &HashMap<String, Report>) -> Result<String, RenderError> {
        let ordered: BTreeMap<&String, &Report> = reports.iter().collect();
        let mut out = match self.format {
            OutputFormat::Yaml => serde_yaml::to_string(&ordered)?,
            OutputFormat::Json if self.pretty => serde_json::to_string_pretty(&ordered)?,
            OutputFormat::Json => serde_json::to_string(&ordered)?,
        };
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }
}
