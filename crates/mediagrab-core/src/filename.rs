//! Output filename selection.
//!
//! The desired title is the preferred filename stem. Titles often contain
//! characters the local filesystem rejects, so the stem is sanitized and then
//! probed; when the probe fails the provider's stable media id is used instead.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

/// Provider placeholder for the stable media identifier.
pub const ID_STEM: &str = "%(id)s";

/// Provider placeholder for the container extension.
pub const EXTENSION_PLACEHOLDER: &str = "%(ext)s";

const MAX_STEM_LEN: usize = 200;
const PROBE_SUFFIX: &str = ".mediagrab-probe";

/// Sanitize a string for use as a filename.
///
/// Path separators and reserved characters become `_`, surrounding
/// whitespace and dots are trimmed, and the result is limited to 200
/// characters. `%` is escaped so titles cannot inject provider placeholders.
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let sanitized: String = name
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');

    trimmed
        .chars()
        .take(MAX_STEM_LEN)
        .collect::<String>()
        .replace('%', "%%")
}

/// Best-effort check that a file named `stem` can be created in `directory`.
///
/// Never fails: any error means "not writable".
pub fn probe_writable(directory: &Path, stem: &str) -> bool {
    if stem.is_empty() {
        return false;
    }

    let probe = directory.join(format!("{stem}{PROBE_SUFFIX}"));
    let result = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe);

    match result {
        Ok(file) => {
            drop(file);
            if let Err(e) = std::fs::remove_file(&probe) {
                debug!("Could not remove probe file {}: {}", probe.display(), e);
            }
            true
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            OpenOptions::new().append(true).open(&probe).is_ok()
        }
        Err(e) => {
            debug!("Filename probe failed for {}: {}", probe.display(), e);
            false
        }
    }
}

/// Build the provider output template for a download.
///
/// Uses the sanitized title when it probes writable, otherwise the
/// provider's id placeholder.
pub fn resolve_output_template(destination: &Path, desired_title: &str) -> String {
    let stem = sanitize_filename(desired_title);
    let stem = if probe_writable(destination, &stem.replace("%%", "%")) {
        stem
    } else {
        debug!(
            "Title '{}' is not writable in {}, using media id",
            desired_title,
            destination.display()
        );
        ID_STEM.to_string()
    };

    destination
        .join(format!("{stem}.{EXTENSION_PLACEHOLDER}"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World"), "Hello World");
        assert_eq!(sanitize_filename("Test/Video"), "Test_Video");
        assert_eq!(sanitize_filename("A: B? C*"), "A_ B_ C_");
        assert_eq!(sanitize_filename("  ..hidden..  "), "hidden");
    }

    #[test]
    fn test_sanitize_filename_limits_length_on_char_boundary() {
        let long = "é".repeat(300);
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 200);
    }

    #[test]
    fn test_sanitize_filename_escapes_placeholders() {
        assert_eq!(sanitize_filename("100% %(id)s"), "100%% %%(id)s");
    }

    #[test]
    fn test_probe_writable_in_temp_dir() {
        let dir = TempDir::new().unwrap();
        assert!(probe_writable(dir.path(), "My Clip"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_probe_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(!probe_writable(&dir.path().join("missing"), "clip"));
    }

    #[test]
    fn test_probe_fails_for_empty_stem() {
        let dir = TempDir::new().unwrap();
        assert!(!probe_writable(dir.path(), ""));
    }

    #[test]
    fn test_output_template_uses_title() {
        let dir = TempDir::new().unwrap();
        let template = resolve_output_template(dir.path(), "Song: Live");
        assert!(template.ends_with("Song_ Live.%(ext)s"));
        assert!(template.starts_with(&*dir.path().to_string_lossy()));
    }

    #[test]
    fn test_output_template_falls_back_to_id() {
        let dir = TempDir::new().unwrap();
        let template = resolve_output_template(dir.path(), "   ");
        assert!(template.ends_with("%(id)s.%(ext)s"));

        let missing = dir.path().join("nope");
        let template = resolve_output_template(&missing, "Title");
        assert!(template.ends_with("%(id)s.%(ext)s"));
    }
}
