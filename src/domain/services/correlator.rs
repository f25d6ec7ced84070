//! Result Correlator
//!
//! Joins per-name resolution results with per-IP enrichment results.

use crate::domain::entities::{Report, ResolutionResult, ResumeAboutIP};
use std::collections::HashMap;

/// Build one report per resolved name.
///
/// Each report gets every resume whose `request_ip` is among that name's
/// addresses. An IP shared by several names shows up under each of them.
/// Names without addresses still get a report, with no resumes.
pub fn correlate(
    resolutions: &HashMap<String, ResolutionResult>,
    resumes: &[ResumeAboutIP],
) -> HashMap<String, Report> {
    resolutions
        .iter()
        .map(|(name, resolved)| {
            let matched = resumes
                .iter()
                .filter(|resume| resolved.ips.contains(&resume.request_ip))
                .cloned()
                .collect();

            let report = Report {
                resolve_duration_ms: resolved.duration_ms,
                ips: resolved.ips.clone(),
                name_servers: resolved.name_servers.clone(),
                ip_error: resolved.ip_error.clone(),
                ns_error: resolved.ns_error.clone(),
                resumes: matched,
            };
            (name.clone(), report)
        })
        .collect()
}
