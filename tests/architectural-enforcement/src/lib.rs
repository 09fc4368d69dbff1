//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking sleeps, and async sleeps only for the layout settle fallback
//! - No `unwrap()`/`expect()` in production code
//! - No stdout printing from the core library
//!
//! The helpers here walk the workspace sources; the checks live in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Production crates checked by every rule, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["conductor/core/src", "conductor/replay/src"];

/// A rule violation at a source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the violation is in
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// Offending line, trimmed
    pub line: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line_number, self.line)
    }
}

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Code lines of a file up to its test module, with comments stripped
///
/// Returns `(line_number, code)` pairs. Everything from the first
/// `#[cfg(test)]` on is test code and is not returned.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Scan production lines of every file in `dirs` with `check`
///
/// `check` receives the file path, all production lines of the file, and the
/// index of the line under test.
pub fn scan<F>(dirs: &[&str], check: F) -> Vec<Violation>
where
    F: Fn(&Path, &[(usize, String)], usize) -> bool,
{
    let mut violations = Vec::new();

    for dir in dirs {
        for path in rust_sources(dir) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let lines = production_lines(&content);
            for idx in 0..lines.len() {
                if check(&path, &lines, idx) {
                    let (line_number, line) = &lines[idx];
                    violations.push(Violation {
                        path: path.clone(),
                        line_number: *line_number,
                        line: line.trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

/// Print violations and panic if there are any
pub fn report(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) of: {rule}.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_tests() {
        let source = "fn a() {}\n// comment\nlet x = y; // trailing\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);
        assert_eq!(
            lines,
            vec![(1, "fn a() {}".to_string()), (3, "let x = y; ".to_string())]
        );
    }

    #[test]
    fn test_sources_found() {
        assert!(!rust_sources("conductor/core/src").is_empty());
    }
}
