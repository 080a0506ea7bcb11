//! Magnet locator parsing and the active-jobs report

use crate::daemon::JobStatus;
use regex::Regex;
use std::sync::LazyLock;

// Constant patterns, compiled on first use
#[allow(clippy::expect_used)]
static MAGNET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"magnet:\?\S+").expect("magnet pattern compiles"));

#[allow(clippy::expect_used)]
static BTIH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)xt=urn:btih:([0-9a-z]+)").expect("btih pattern compiles")
});

// First word run terminated by '&' or end of input
#[allow(clippy::expect_used)]
static TRAILING_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)(?:$|&)").expect("word run pattern compiles"));

/// Maximum characters of a job name shown in the active report
pub const REPORT_NAME_LIMIT: usize = 50;

/// Find the first magnet locator in free-form text
pub fn find_magnet(text: &str) -> Option<&str> {
    MAGNET_RE.find(text).map(|m| m.as_str())
}

/// Content hash of a magnet locator, as the daemon uses it to name the metadata artifact.
///
/// Reads the `xt=urn:btih:` parameter when present; otherwise takes the first
/// word run that ends at `&` or the end of the locator. Returns an empty string
/// when nothing matches.
pub fn content_hash(locator: &str) -> String {
    if let Some(caps) = BTIH_RE.captures(locator)
        && let Some(hash) = caps.get(1)
    {
        return hash.as_str().to_lowercase();
    }

    TRAILING_WORD_RE
        .captures(locator)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Display name (`dn` parameters) of a magnet locator, space-joined
pub fn display_name(locator: &str) -> String {
    let query = locator.strip_prefix("magnet:?").unwrap_or(locator);
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "dn")
        .map(|(_, value)| value.into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the owner-facing list of active daemon jobs
pub fn render_active_report(jobs: &[JobStatus]) -> String {
    let mut report = String::new();
    for job in jobs {
        let name = if job.name().is_empty() {
            job.info_hash.as_str()
        } else {
            job.name()
        };
        let name: String = name.chars().take(REPORT_NAME_LIMIT).collect();

        let progress = if job.total_length != 0 {
            format!(
                "downloaded {}%",
                job.completed_length.saturating_mul(100) / job.total_length
            )
        } else {
            "completeness unknown".to_string()
        };

        report.push_str(&format!("GID: {}\t{}\t{}\n\n", job.gid, name, progress));
    }

    if report.is_empty() {
        report.push_str("No active tasks.");
    }
    report
}
