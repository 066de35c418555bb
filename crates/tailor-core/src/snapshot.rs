//! Structural snapshot taken before an edit
//!
//! Records the import lines, export lines and primary declared name of a
//! file. An edit is accepted only if the edited content still carries all of
//! them; missing import/export lines can be re-inserted once, next to the
//! line that preceded them in the original.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// One import or export line from the original content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLine {
    /// 1-based line number in the original content
    pub line: usize,
    /// The line as written, without its line ending
    pub raw: String,
}

impl SnapshotLine {
    pub fn text(&self) -> &str {
        self.raw.trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSnapshot {
    pub imports: Vec<SnapshotLine>,
    pub exports: Vec<SnapshotLine>,
    pub primary_name: Option<String>,
}

/// What an edited file lost relative to its snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub missing_imports: Vec<String>,
    pub missing_exports: Vec<String>,
    pub missing_primary_name: Option<String>,
}

impl ValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.missing_imports.is_empty()
            && self.missing_exports.is_empty()
            && self.missing_primary_name.is_none()
    }

    /// Only the primary name cannot be restored by re-inserting lines.
    pub fn is_repairable(&self) -> bool {
        self.missing_primary_name.is_none()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_imports.is_empty() {
            parts.push(format!("{} import line(s) missing", self.missing_imports.len()));
        }
        if !self.missing_exports.is_empty() {
            parts.push(format!("{} export line(s) missing", self.missing_exports.len()));
        }
        if let Some(name) = &self.missing_primary_name {
            parts.push(format!("primary declaration `{}` missing", name));
        }
        if parts.is_empty() {
            write!(f, "no structural violations")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl std::error::Error for ValidationFailure {}

impl StructuralSnapshot {
    pub fn capture(content: &str) -> Self {
        let mut imports = Vec::new();
        let mut exports = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            let trimmed = raw.trim_start();
            let entry = || SnapshotLine {
                line: idx + 1,
                raw: raw.trim_end_matches('\r').to_string(),
            };
            if is_import_line(trimmed) {
                imports.push(entry());
            } else if is_export_line(trimmed) {
                exports.push(entry());
            }
        }

        Self {
            imports,
            exports,
            primary_name: primary_name(content),
        }
    }

    pub fn validate(&self, content: &str) -> Result<(), ValidationFailure> {
        let present: Vec<&str> = content.lines().map(str::trim).collect();
        let missing = |lines: &[SnapshotLine]| -> Vec<String> {
            lines
                .iter()
                .filter(|l| !present.contains(&l.text()))
                .map(|l| l.text().to_string())
                .collect()
        };

        let failure = ValidationFailure {
            missing_imports: missing(&self.imports),
            missing_exports: missing(&self.exports),
            missing_primary_name: self
                .primary_name
                .as_ref()
                .filter(|name| !contains_token(content, name))
                .cloned(),
        };

        if failure.is_empty() {
            Ok(())
        } else {
            Err(failure)
        }
    }

    /// Re-insert missing import/export lines and re-validate once.
    ///
    /// Each missing line goes after the nearest line that preceded it in
    /// `original` and still appears exactly once in `edited`. Lines with no
    /// surviving anchor go to the top (imports) or the end (exports).
    /// Returns `None` when the result still fails validation.
    pub fn repair(&self, original: &str, edited: &str) -> Option<String> {
        let failure = match self.validate(edited) {
            Ok(()) => return Some(edited.to_string()),
            Err(failure) => failure,
        };
        if !failure.is_repairable() {
            return None;
        }

        let newline = if edited.contains("\r\n") || original.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        };
        let original_lines: Vec<&str> = original.lines().collect();
        let mut lines: Vec<String> = edited.lines().map(str::to_string).collect();

        let mut missing: Vec<(&SnapshotLine, bool)> = self
            .imports
            .iter()
            .filter(|l| failure.missing_imports.iter().any(|m| m == l.text()))
            .map(|l| (l, true))
            .chain(
                self.exports
                    .iter()
                    .filter(|l| failure.missing_exports.iter().any(|m| m == l.text()))
                    .map(|l| (l, false)),
            )
            .collect();
        missing.sort_by_key(|(l, _)| l.line);

        for (snapshot_line, is_import) in missing {
            let anchor = original_lines[..snapshot_line.line.saturating_sub(1)]
                .iter()
                .rev()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .find_map(|needle| unique_line_index(&lines, needle));

            let insert_at = match anchor {
                Some(idx) => idx + 1,
                None if is_import => leading_import_end(&lines),
                None => lines.len(),
            };
            lines.insert(insert_at, snapshot_line.raw.clone());
        }

        let mut repaired = lines.join(newline);
        if edited.ends_with('\n') {
            repaired.push_str(newline);
        }

        match self.validate(&repaired) {
            Ok(()) => Some(repaired),
            Err(_) => None,
        }
    }
}

pub fn is_import_line(trimmed: &str) -> bool {
    (trimmed.starts_with("import ") || trimmed.starts_with("import{"))
        && !trimmed.starts_with("import(")
}

pub fn is_export_line(trimmed: &str) -> bool {
    trimmed.starts_with("export ") || trimmed.starts_with("export{")
}

fn unique_line_index(lines: &[String], needle: &str) -> Option<usize> {
    let mut found = None;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim() == needle {
            if found.is_some() {
                return None;
            }
            found = Some(idx);
        }
    }
    found
}

fn leading_import_end(lines: &[String]) -> usize {
    lines
        .iter()
        .rposition(|l| is_import_line(l.trim_start()))
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

fn primary_name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?m)^\s*export\s+default\s+(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
            r"(?m)^\s*export\s+default\s+class\s+([A-Za-z_$][\w$]*)",
            r"(?m)^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$",
            r"(?m)^\s*export\s+(?:async\s+)?function\s+([A-Z][\w$]*)",
            r"(?m)^\s*export\s+(?:const|let|class)\s+([A-Z][\w$]*)",
            r"(?m)^\s*(?:async\s+)?function\s+([A-Z][\w$]*)",
            r"(?m)^\s*(?:const|let)\s+([A-Z][\w$]*)\s*(?::[^=]+)?=",
            r"(?m)^\s*class\s+([A-Z][\w$]*)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// The component or function a file is built around.
pub fn primary_name(content: &str) -> Option<String> {
    primary_name_patterns().iter().find_map(|re| {
        re.captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|name| name != "function" && name != "class")
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whole-identifier occurrence of `token` in `content`.
pub fn contains_token(content: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    content.match_indices(token).any(|(idx, _)| {
        let before = content[..idx].chars().next_back();
        let after = content[idx + token.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "import React from \"react\";\nimport { Button } from \"./Button\";\n\nexport default function Signup() {\n  return <Button>Go</Button>;\n}\n\nexport const SIGNUP_ROUTE = \"/signup\";\n";

    #[test]
    fn capture_records_imports_exports_and_primary_name() {
        let snapshot = StructuralSnapshot::capture(ORIGINAL);
        assert_eq!(snapshot.imports.len(), 2);
        assert_eq!(snapshot.imports[1].line, 2);
        assert_eq!(snapshot.exports.len(), 2);
        assert_eq!(snapshot.primary_name.as_deref(), Some("Signup"));
    }

    #[test]
    fn validating_original_against_itself_succeeds() {
        let snapshot = StructuralSnapshot::capture(ORIGINAL);
        assert!(snapshot.validate(ORIGINAL).is_ok());
        assert_eq!(snapshot.repair(ORIGINAL, ORIGINAL).as_deref(), Some(ORIGINAL));
    }

    #[test]
    fn indentation_changes_do_not_fail_validation() {
        let snapshot = StructuralSnapshot::capture(ORIGINAL);
        let reindented = ORIGINAL.replace("import { Button }", "  import { Button }");
        assert!(snapshot.validate(&reindented).is_ok());
    }

    #[test]
    fn dropped_import_is_reported_and_repaired_in_place() {
        let snapshot = StructuralSnapshot::capture(ORIGINAL);
        let edited = ORIGINAL.replace("import { Button } from \"./Button\";\n", "");
        let failure = snapshot.validate(&edited).unwrap_err();
        assert_eq!(failure.missing_imports, vec!["import { Button } from \"./Button\";"]);
        assert!(failure.is_repairable());

        let repaired = snapshot.repair(ORIGINAL, &edited).expect("repairable");
        assert_eq!(repaired, ORIGINAL);
    }

    #[test]
    fn dropped_export_with_no_anchor_goes_to_the_end() {
        let original = "export const A = 1;\nexport const B = 2;\n";
        let snapshot = StructuralSnapshot::capture(original);
        let edited = "const other = 3;\n";
        let repaired = snapshot.repair(original, edited).expect("repairable");
        assert!(snapshot.validate(&repaired).is_ok());
        assert!(repaired.starts_with("const other = 3;"));
    }

    #[test]
    fn missing_primary_name_is_not_repairable() {
        let snapshot = StructuralSnapshot::capture(ORIGINAL);
        let edited = ORIGINAL.replace("Signup", "Register");
        let failure = snapshot.validate(&edited).unwrap_err();
        assert_eq!(failure.missing_primary_name.as_deref(), Some("Signup"));
        assert!(snapshot.repair(ORIGINAL, &edited).is_none());
    }

    #[test]
    fn primary_name_prefers_default_export() {
        let content = "function Helper() {}\nexport default function Page() { return null; }\n";
        assert_eq!(primary_name(content).as_deref(), Some("Page"));
        assert_eq!(primary_name("export default App;\n").as_deref(), Some("App"));
        assert_eq!(primary_name("const x = 1;\n"), None);
    }

    #[test]
    fn token_match_respects_identifier_boundaries() {
        assert!(contains_token("<About />", "About"));
        assert!(!contains_token("const AboutPage = 1;", "About"));
        assert!(!contains_token("$About", "About"));
    }

    #[test]
    fn dynamic_import_is_not_an_import_line() {
        assert!(!is_import_line("import(\"./lazy\")"));
        assert!(is_import_line("import './styles.css';"));
    }
}
