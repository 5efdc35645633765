use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental rewrite primitive: byte-span replacement with verification.
///
/// Every replacement rule compiles down to one or more of these against the
/// current source text of a single module. Intelligence lives in span
/// acquisition (literal search, regex), not application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (cheaper for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    ///
    /// Minified bundles routinely produce multi-kilobyte regex matches.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range [{byte_start}, {byte_end}) in source of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("overlapping edits at [{byte_start}, {byte_end})")]
    Overlap { byte_start: usize, byte_end: usize },

    #[error("edit boundary splits a UTF-8 character at byte {0}")]
    InvalidUtf8Edit(usize),
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Validate the edit against the current source text.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::InvalidUtf8Edit(offset));
            }
        }

        let current = &content[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `content`, returning the rewritten text.
    pub fn apply_to(&self, content: &str) -> Result<String, EditError> {
        apply_batch(content, std::slice::from_ref(self))
    }
}

/// Apply several edits to one source text in a single pass.
///
/// Edits are validated against the original text, checked for overlap, then
/// spliced bottom-to-top so earlier offsets stay valid.
pub fn apply_batch(content: &str, edits: &[Edit]) -> Result<String, EditError> {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

    for edit in &ordered {
        edit.validate(content)?;
    }

    // Sorted descending: the earlier edit must end before the later one starts
    for window in ordered.windows(2) {
        let (later, earlier) = (window[0], window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap {
                byte_start: later.byte_start,
                byte_end: earlier.byte_end,
            });
        }
    }

    let mut new_content = content.to_string();
    for edit in ordered {
        new_content.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
    }

    Ok(new_content)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("=5".to_string());
        assert!(verify.matches("=5"));
        assert!(!verify.matches("=6"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
        assert!(!verify.matches("x"));
    }

    #[test]
    fn test_apply_single_edit() {
        let content = "const maxAccounts=5;";
        let edit = Edit::new(17, 19, "=Infinity", "=5");
        assert_eq!(edit.apply_to(content).unwrap(), "const maxAccounts=Infinity;");
    }

    #[test]
    fn test_edit_rejects_stale_pre_image() {
        let edit = Edit::new(17, 19, "=Infinity", "=5");
        let result = edit.apply_to("const maxAccounts=7;");
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_edit_validation_invalid_range() {
        let edit = Edit::new(5, 50, "x", "");
        assert!(matches!(
            edit.apply_to("short"),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_edit_rejects_split_character() {
        let edit = Edit::new(1, 2, "x", "");
        assert!(matches!(
            edit.apply_to("é!"),
            Err(EditError::InvalidUtf8Edit(1))
        ));
    }

    #[test]
    fn test_batch_edits_bottom_to_top() {
        let content = "a=1;b=2;c=3;";
        let edits = vec![
            Edit::new(2, 3, "10", "1"),
            Edit::new(10, 11, "30", "3"),
            Edit::new(6, 7, "20", "2"),
        ];
        assert_eq!(apply_batch(content, &edits).unwrap(), "a=10;b=20;c=30;");
    }

    #[test]
    fn test_batch_rejects_overlap() {
        let edits = vec![Edit::new(0, 4, "x", "abcd"), Edit::new(2, 6, "y", "cdef")];
        assert!(matches!(
            apply_batch("abcdefgh", &edits),
            Err(EditError::Overlap { .. })
        ));
    }

    #[test]
    fn test_atomic_write_replaces_contents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        fs::write(&path, b"{}").unwrap();

        atomic_write(&path, br#"{"a":1}"#).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"a":1}"#);
    }
}
