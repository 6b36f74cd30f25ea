//! Project registry — the `[[projects]]` tables of the harvest config.
//!
//! Each entry names a quality-service component and a CI job. Entries are
//! resolved into [`ProjectSource`]s in file order; that order is kept for
//! dispatch and for listing, though results come back in arrival order.

use std::collections::BTreeSet;

use health_harvest_models::ProjectSource;
use serde::Deserialize;

use crate::ConfigError;

/// Environment variable holding a comma-separated project filter.
pub const PROJECTS_ENV: &str = "HARVEST_PROJECTS";

/// One `[[projects]]` table as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectEntry {
    /// Project key, written to the `project_key` tag.
    pub key: String,
    /// Component type label (e.g. `"backend"`).
    #[serde(rename = "type", default)]
    pub component_type: String,
    /// Quality-service component key, when it differs from `key`.
    #[serde(default)]
    pub quality_key: Option<String>,
    /// CI job base URL (`.../job/<name>`).
    pub job: String,
}

impl ProjectEntry {
    fn into_source(self) -> ProjectSource {
        let quality_query_key = self
            .quality_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| self.key.clone());

        ProjectSource {
            key: self.key,
            component_type: self.component_type,
            quality_query_key,
            build_endpoint: self.job.trim_end_matches('/').to_string(),
        }
    }
}

/// Resolves config entries into project sources.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if a key or job URL is empty, or if two
/// entries share a key.
pub fn resolve_projects(entries: Vec<ProjectEntry>) -> Result<Vec<ProjectSource>, ConfigError> {
    let mut seen = BTreeSet::new();
    let mut sources = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.key.trim().is_empty() {
            return Err(ConfigError::invalid("project with an empty key"));
        }
        if entry.job.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "project '{}' has no job URL",
                entry.key
            )));
        }
        if !seen.insert(entry.key.clone()) {
            return Err(ConfigError::invalid(format!(
                "duplicate project key '{}'",
                entry.key
            )));
        }
        sources.push(entry.into_source());
    }

    Ok(sources)
}

/// Returns the projects to harvest, filtered by the `--projects` CLI flag
/// or the `HARVEST_PROJECTS` environment variable. If neither is set, all
/// projects are returned.
#[must_use]
pub fn enabled_projects(
    projects: &[ProjectSource],
    cli_filter: Option<String>,
) -> Vec<ProjectSource> {
    let filter = cli_filter.or_else(|| std::env::var(PROJECTS_ENV).ok());

    let Some(filter_str) = filter else {
        return projects.to_vec();
    };

    let keys: Vec<&str> = filter_str
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect();

    let filtered: Vec<ProjectSource> = projects
        .iter()
        .filter(|p| keys.contains(&p.key.as_str()))
        .cloned()
        .collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching projects found for filter {:?}. Available: {}",
            keys,
            projects
                .iter()
                .map(|p| p.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    filtered
}
