//! Schema filename classification.
//!
//! Version schemas are stored as `schema-X.Y.Z.json`; everything else in
//! the schema directory is a base document addressed by its bare filename.

use std::sync::LazyLock;

use regex::Regex;

static SEMVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("semver pattern"));

static VERSION_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^schema-(\d+\.\d+\.\d+)\.json$").expect("version-file pattern"));

/// Whether `s` is a full `MAJOR.MINOR.PATCH` version.
#[must_use]
pub fn is_semver(s: &str) -> bool {
    SEMVER.is_match(s)
}

/// Canonical node name for a schema filename.
///
/// `schema-1.0.0.json` becomes `1.0.0`; anything else (base documents,
/// already-normalized names) passes through unchanged.
#[must_use]
pub fn normalize_name(filename: &str) -> String {
    let bare = filename.rsplit('/').next().unwrap_or(filename);
    match VERSION_FILE.captures(bare) {
        Some(caps) => caps[1].to_string(),
        None => bare.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_files_normalize_to_the_version() {
        assert_eq!(normalize_name("schema-1.0.0.json"), "1.0.0");
        assert_eq!(normalize_name("schemas/schema-0.12.3.json"), "0.12.3");
    }

    #[test]
    fn base_documents_keep_their_filename() {
        assert_eq!(normalize_name("base-schema.json"), "base-schema.json");
        assert_eq!(normalize_name("schema-extra.json"), "schema-extra.json");
        assert_eq!(normalize_name("1.0.0"), "1.0.0");
    }

    #[test]
    fn semver_match_is_full() {
        assert!(is_semver("1.0.0"));
        assert!(!is_semver("1.0"));
        assert!(!is_semver("1.0.0-rc1"));
        assert!(!is_semver("v1.0.0"));
    }
}
