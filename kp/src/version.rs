//! Version parsing and gating
//!
//! Template tags and recorded commits are often not strict semver
//! (`v1.2`, `0.0.0a0`, `1.2.3-4-gdeadbee`). [`parse_version`] normalizes the
//! common spellings before handing them to `semver`.

use std::sync::LazyLock;

use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use tracing::debug;

use crate::diagnostics::{Diagnostic, WarningKind};
use crate::error::{KrupyError, Result};

static DESCRIBE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+-g[0-9a-f]+$").expect("valid describe suffix regex"));

static LENIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[-.]?([0-9A-Za-z][0-9A-Za-z.-]*))?$").expect("valid version regex")
});

/// Version of the running tool
pub fn krupy_version() -> Version {
    parse_version(env!("CARGO_PKG_VERSION")).unwrap_or_else(|| Version::new(0, 0, 0))
}

/// Parse a version string leniently
///
/// Accepts a leading `v`, missing minor or patch numbers, prerelease tags
/// glued to the patch number and `git describe` suffixes. Build metadata is
/// dropped.
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    let trimmed = DESCRIBE_SUFFIX.replace(trimmed, "");
    let trimmed = trimmed.split('+').next().unwrap_or_default();

    if let Ok(mut version) = Version::parse(trimmed) {
        version.build = BuildMetadata::EMPTY;
        return Some(version);
    }

    let caps = LENIENT.captures(trimmed)?;
    let number = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u64>().ok());
    let mut version = Version::new(number(1)?, number(2)?, number(3)?);
    if let Some(pre) = caps.get(4) {
        let pre = pre.as_str().trim_matches(|c| c == '.' || c == '-');
        version.pre = Prerelease::new(pre).ok()?;
    }
    debug!(%raw, %version, "parse_version: lenient parse");
    Some(version)
}

/// Check the running version against a template's minimum version
///
/// A running version of exactly `0.0.0` means the build could not tell its
/// own version; the check is skipped with a warning. Warnings are returned
/// for the caller to report.
pub fn check_min_version(min: &str, running: &Version) -> Result<Option<Diagnostic>> {
    debug!(%min, %running, "check_min_version: called");
    let required = parse_version(min)
        .ok_or_else(|| KrupyError::UserMessage(format!("Invalid minimum krupy version \"{}\"", min)))?;

    if *running == Version::new(0, 0, 0) {
        return Ok(Some(Diagnostic::new(
            WarningKind::UnknownVersion,
            format!("Cannot determine the krupy version; skipping the check for {}", required),
        )));
    }
    if *running < required {
        return Err(KrupyError::UnsupportedVersion {
            required: required.to_string(),
            running: running.to_string(),
        });
    }
    if required.major < running.major {
        return Ok(Some(Diagnostic::new(
            WarningKind::OldTemplate,
            format!(
                "This template was made for krupy {} and may not work as expected with {}",
                required, running
            ),
        )));
    }
    Ok(None)
}

/// Check the template version recorded in a previous answers file
pub fn check_recorded_version(recorded: Option<&str>, running: &Version) -> Option<Diagnostic> {
    let recorded = recorded?;
    match parse_version(recorded) {
        None => Some(Diagnostic::new(
            WarningKind::UnknownVersion,
            format!("Cannot determine the version of the previously applied template ({})", recorded),
        )),
        Some(version) if version.major < running.major => Some(Diagnostic::new(
            WarningKind::OldTemplate,
            format!("The previously applied template version {} is older than krupy {}", version, running),
        )),
        Some(_) => None,
    }
}

/// Highest tag that parses as a version
pub fn latest_version_tag(tags: &[String], prereleases: bool) -> Option<String> {
    tags.iter()
        .filter_map(|tag| parse_version(tag).map(|v| (v, tag)))
        .filter(|(v, _)| prereleases || v.pre.is_empty())
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.clone())
}
