use crate::error::Result;
use crate::scanner::DocumentFile;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rewrites shell escapes such as `!pip` into a replacement such as `%pip`.
///
/// Each line is checked against three patterns and only the first one found applies:
///
/// 1. `!<marker>`
/// 2. `! <marker>`
/// 3. `<marker>` anywhere, including inside other words (`pipeline` -> `%pipeline`)
///
/// Every occurrence of the matched pattern on that line is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    bang: String,
    spaced_bang: String,
    marker: String,
    replacement: String,
}

impl RewriteRule {
    pub fn new<M: Into<String>, R: Into<String>>(marker: M, replacement: R) -> Self {
        let marker = marker.into();
        Self {
            bang: format!("!{}", marker),
            spaced_bang: format!("! {}", marker),
            marker,
            replacement: replacement.into(),
        }
    }

    pub fn rewrite_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let pattern = if line.contains(&self.bang) {
            &self.bang
        } else if line.contains(&self.spaced_bang) {
            &self.spaced_bang
        } else if line.contains(&self.marker) {
            &self.marker
        } else {
            return Cow::Borrowed(line);
        };

        Cow::Owned(line.replace(pattern.as_str(), &self.replacement))
    }

    /// Rewrite a whole text, keeping every line ending as it was.
    /// Returns the new text and the number of lines changed.
    pub fn rewrite_text(&self, text: &str) -> (String, usize) {
        let mut output = String::with_capacity(text.len() + 16);
        let mut changed = 0;

        for line in text.split_inclusive('\n') {
            let rewritten = self.rewrite_line(line);
            if let Cow::Owned(_) = rewritten {
                changed += 1;
            }
            output.push_str(&rewritten);
        }

        (output, changed)
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

impl Default for RewriteRule {
    fn default() -> Self {
        Self::new("pip", "%pip")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewriteSummary {
    pub documents_scanned: usize,
    pub documents_changed: Vec<PathBuf>,
    pub lines_changed: usize,
}

pub struct DocumentRewriter {
    rule: RewriteRule,
}

impl DocumentRewriter {
    pub fn new(rule: RewriteRule) -> Self {
        Self { rule }
    }

    /// Rewrite one file in place. Returns the number of lines changed; untouched files are not written.
    pub fn rewrite_file(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        let (rewritten, changed) = self.rule.rewrite_text(&content);

        if changed > 0 {
            fs::write(path, rewritten)?;
            debug!(path = %path.display(), lines = changed, "document rewritten");
        }

        Ok(changed)
    }

    pub fn rewrite_documents(&self, documents: &[DocumentFile]) -> Result<RewriteSummary> {
        let mut summary = RewriteSummary {
            documents_scanned: documents.len(),
            ..RewriteSummary::default()
        };

        for document in documents {
            let changed = self.rewrite_file(&document.path)?;
            if changed > 0 {
                summary.documents_changed.push(document.path.clone());
                summary.lines_changed += changed;
            }
        }

        Ok(summary)
    }
}

impl Default for DocumentRewriter {
    fn default() -> Self {
        Self::new(RewriteRule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bang_prefix() {
        let rule = RewriteRule::default();
        assert_eq!(rule.rewrite_line("!pip install foo"), "%pip install foo");
    }

    #[test]
    fn test_spaced_bang_prefix() {
        let rule = RewriteRule::default();
        assert_eq!(rule.rewrite_line("! pip install foo"), "%pip install foo");
    }

    #[test]
    fn test_bare_marker_is_rewritten() {
        let rule = RewriteRule::default();
        assert_eq!(rule.rewrite_line("my pip notes"), "my %pip notes");
        assert_eq!(rule.rewrite_line("a pipeline"), "a %pipeline");
    }

    #[test]
    fn test_first_match_wins() {
        let rule = RewriteRule::default();

        // Only `!pip` occurrences change; the bare `pip` later in the line is kept
        assert_eq!(
            rule.rewrite_line("!pip install pip-tools"),
            "%pip install pip-tools"
        );
        assert_eq!(
            rule.rewrite_line("! pip install pipx"),
            "%pip install pipx"
        );
    }

    #[test]
    fn test_all_occurrences_of_matched_pattern_change() {
        let rule = RewriteRule::default();
        assert_eq!(
            rule.rewrite_line("!pip install a && !pip install b"),
            "%pip install a && %pip install b"
        );
    }

    #[test]
    fn test_existing_replacement_is_rewritten_again() {
        let rule = RewriteRule::default();
        assert_eq!(rule.rewrite_line("%pip install foo"), "%%pip install foo");
    }

    #[test]
    fn test_untouched_line_is_borrowed() {
        let rule = RewriteRule::default();
        assert!(matches!(
            rule.rewrite_line("import numpy as np\n"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_line_endings_are_preserved() {
        let rule = RewriteRule::default();
        let (text, changed) = rule.rewrite_text("intro\r\n!pip install x\r\nend");
        assert_eq!(text, "intro\r\n%pip install x\r\nend");
        assert_eq!(changed, 1);
    }

    #[test]
    fn test_custom_marker() {
        let rule = RewriteRule::new("conda", "%conda");
        assert_eq!(rule.rewrite_line("!conda install x"), "%conda install x");
        assert_eq!(rule.rewrite_line("!pip install x"), "!pip install x");
    }

    #[test]
    fn test_rewrite_documents_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let changed_path = temp_dir.path().join("a.md");
        let same_path = temp_dir.path().join("b.md");
        std::fs::write(&changed_path, "# A\n```\n!pip install quantecon\n```\n").unwrap();
        std::fs::write(&same_path, "# B\nnothing here\n").unwrap();

        let documents = vec![
            DocumentFile::new(changed_path.clone(), 0),
            DocumentFile::new(same_path.clone(), 0),
        ];

        let summary = DocumentRewriter::default()
            .rewrite_documents(&documents)
            .unwrap();

        assert_eq!(summary.documents_scanned, 2);
        assert_eq!(summary.documents_changed, vec![changed_path.clone()]);
        assert_eq!(summary.lines_changed, 1);
        assert_eq!(
            std::fs::read_to_string(&changed_path).unwrap(),
            "# A\n```\n%pip install quantecon\n```\n"
        );
        assert_eq!(
            std::fs::read_to_string(&same_path).unwrap(),
            "# B\nnothing here\n"
        );
    }
}
