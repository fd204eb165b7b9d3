//! Extracting file paths out of command-line strings.
//!
//! Registry values rarely hold a clean path: startup commands carry
//! arguments, uninstall strings carry flags, firewall rules embed the path in
//! a token soup. `extract_file_path` applies the same layered heuristics to
//! all of them. File-existence checks go through [`FileProbe`] so tests can
//! pin down exactly which paths resolve.

use std::env;
use std::path::Path;

/// Extensions that mark the end of an executable-ish path inside a larger
/// command line.
const EXECUTABLE_EXTENSIONS: &[&str] = &[".exe", ".dll", ".ocx", ".sys", ".cpl", ".scr"];

/// Answers "does this path exist on disk".
pub trait FileProbe: Send + Sync {
    /// Whether the path resolves to an existing file or directory.
    fn exists(&self, path: &str) -> bool;
}

/// The real thing: asks the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskProbe;

impl FileProbe for DiskProbe {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

/// A probe backed by a fixed list, for tests. Matching is case-insensitive,
/// like the filesystems these paths come from.
#[derive(Debug, Default, Clone)]
pub struct FixedProbe {
    known: Vec<String>,
}

impl FixedProbe {
    /// A probe where nothing exists.
    #[must_use]
    pub const fn empty() -> Self {
        Self { known: Vec::new() }
    }

    /// A probe where exactly the given paths exist.
    #[must_use]
    pub fn with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: paths
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Add one more existing path.
    pub fn add(&mut self, path: impl Into<String>) {
        self.known.push(path.into().to_ascii_lowercase());
    }
}

impl FileProbe for FixedProbe {
    fn exists(&self, path: &str) -> bool {
        let folded = path.to_ascii_lowercase();
        self.known.contains(&folded)
    }
}

/// Pull a plausible file path out of a command-line style string.
///
/// Layered heuristics, first match wins:
/// 1. quoted prefix: `"C:\app\tool.exe" -flag` yields the quoted part
/// 2. earliest executable-like extension ends the path
/// 3. first-space split, kept only when the prefix actually exists
/// 4. the whole (trimmed, env-expanded) string otherwise
///
/// Returns `None` for empty input.
#[must_use]
pub fn extract_file_path(raw: &str, probe: &dyn FileProbe) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let expanded = expand_env_vars(trimmed);
    let text = expanded.trim();

    if let Some(rest) = text.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            let inner = rest[..end].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
        return None;
    }

    if let Some(cut) = extension_boundary(text) {
        return Some(text[..cut].to_string());
    }

    if let Some(space) = text.find(' ') {
        let prefix = text[..space].trim();
        if !prefix.is_empty() && probe.exists(prefix) {
            return Some(prefix.to_string());
        }
    }

    Some(text.to_string())
}

/// Whether the extracted target of a raw value string is present on disk.
///
/// Strings with no extractable path count as existing; there is nothing to
/// verify, and reporting them would be noise.
#[must_use]
pub fn target_exists(raw: &str, probe: &dyn FileProbe) -> bool {
    extract_file_path(raw, probe).is_none_or(|path| probe.exists(&path))
}

/// Expand `%NAME%` placeholders from the process environment. Unset
/// variables are left as-is.
#[must_use]
pub fn expand_env_vars(text: &str) -> String {
    if !text.contains('%') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match lookup_env(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // unmatched percent, keep the remainder verbatim
                out.push('%');
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Case-insensitive environment lookup, matching Windows semantics.
fn lookup_env(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if let Ok(value) = env::var(name) {
        return Some(value);
    }
    env::vars()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// Byte offset just past the earliest executable extension, if any.
///
/// The extension must end the string or be followed by a non-path character,
/// so `update.exec` is not cut at `.exe`.
fn extension_boundary(text: &str) -> Option<usize> {
    let folded = text.to_ascii_lowercase();
    let mut best: Option<usize> = None;
    for ext in EXECUTABLE_EXTENSIONS {
        let mut from = 0;
        while let Some(pos) = folded[from..].find(ext) {
            let end = from + pos + ext.len();
            let boundary_ok = folded[end..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_ascii_alphanumeric());
            if boundary_ok {
                best = Some(best.map_or(end, |b| b.min(end)));
                break;
            }
            from += pos + 1;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_path_wins_over_everything() {
        let probe = FixedProbe::empty();
        assert_eq!(
            extract_file_path("\"C:\\Program Files\\App\\tool.exe\" -silent", &probe),
            Some("C:\\Program Files\\App\\tool.exe".to_string())
        );
    }

    #[test]
    fn extension_truncates_trailing_arguments() {
        let probe = FixedProbe::empty();
        assert_eq!(
            extract_file_path("C:\\App\\tool.exe -run now", &probe),
            Some("C:\\App\\tool.exe".to_string())
        );
        assert_eq!(
            extract_file_path("C:\\Windows\\helper.DLL,EntryPoint", &probe),
            Some("C:\\Windows\\helper.DLL".to_string())
        );
    }

    #[test]
    fn extension_requires_a_boundary() {
        let probe = FixedProbe::empty();
        // ".exe" inside "update.exec" must not cut the path
        assert_eq!(
            extract_file_path("C:\\App\\update.exec", &probe),
            Some("C:\\App\\update.exec".to_string())
        );
    }

    #[test]
    fn first_space_split_needs_probe_confirmation() {
        let with_file = FixedProbe::with_paths(["C:\\App\\runner"]);
        assert_eq!(
            extract_file_path("C:\\App\\runner --verbose", &with_file),
            Some("C:\\App\\runner".to_string())
        );

        // Same input, path unknown: the whole string comes back.
        let without = FixedProbe::empty();
        assert_eq!(
            extract_file_path("C:\\App\\runner --verbose", &without),
            Some("C:\\App\\runner --verbose".to_string())
        );
    }

    #[test]
    fn empty_and_blank_yield_none() {
        let probe = FixedProbe::empty();
        assert_eq!(extract_file_path("", &probe), None);
        assert_eq!(extract_file_path("   ", &probe), None);
        assert_eq!(extract_file_path("\"\"", &probe), None);
    }

    #[test]
    fn env_vars_expand_case_insensitively() {
        // PATH is set everywhere the tests run.
        let path = env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("%PATH%"), path);
        assert_eq!(expand_env_vars("%path%"), path);
    }

    #[test]
    fn unknown_env_var_left_verbatim() {
        assert_eq!(
            expand_env_vars("%NO_SUCH_VAR_ANYWHERE%\\x"),
            "%NO_SUCH_VAR_ANYWHERE%\\x"
        );
        assert_eq!(expand_env_vars("50% done"), "50% done");
    }

    #[test]
    fn target_exists_respects_probe() {
        let probe = FixedProbe::with_paths(["C:\\App\\tool.exe"]);
        assert!(target_exists("\"C:\\App\\tool.exe\" -x", &probe));
        assert!(!target_exists("C:\\Gone\\old.exe /s", &probe));
    }

    #[test]
    fn fixed_probe_is_case_insensitive() {
        let probe = FixedProbe::with_paths(["C:\\App\\Tool.exe"]);
        assert!(probe.exists("c:\\app\\tool.exe"));
        assert!(!probe.exists("c:\\app\\other.exe"));
    }
}
