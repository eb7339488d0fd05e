use crate::errors::StoreResult;
use std::fs;
use std::path::Path;

pub const TAGS_FILE: &str = "tags.txt";

/// Tag values are trimmed and lower-cased before any comparison or storage.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Directory-scoped autocomplete source: one normalized tag per line,
/// deduplicated preserving first-seen order. Absent file reads as empty.
pub fn load_tags(root: &Path) -> StoreResult<Vec<String>> {
    let path = root.join(TAGS_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let mut tags: Vec<String> = Vec::new();
    for line in content.lines() {
        let tag = normalize_tag(line);
        if tag.is_empty() || tags.iter().any(|existing| existing == &tag) {
            continue;
        }
        tags.push(tag);
    }
    Ok(tags)
}

/// Append `tag` to the registry if it is not already present
/// (case-insensitively). Returns whether the registry grew. The registry is
/// purely additive and never pruned.
pub fn add_tag(root: &Path, tag: &str) -> StoreResult<bool> {
    let tag = normalize_tag(tag);
    if tag.is_empty() {
        return Ok(false);
    }
    let mut tags = load_tags(root)?;
    if tags.iter().any(|existing| existing == &tag) {
        return Ok(false);
    }
    tags.push(tag);
    let mut content = tags.join("\n");
    content.push('\n');
    fs::write(root.join(TAGS_FILE), content)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_tags(dir.path()).expect("load").is_empty());
    }

    #[test]
    fn add_normalizes_and_deduplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(add_tag(dir.path(), " Work ").expect("add"));
        assert!(!add_tag(dir.path(), "work").expect("duplicate add"));
        assert!(!add_tag(dir.path(), "WORK").expect("case-insensitive duplicate"));
        assert!(add_tag(dir.path(), "rust").expect("second tag"));

        assert_eq!(load_tags(dir.path()).expect("load"), vec!["work", "rust"]);
    }

    #[test]
    fn blank_and_duplicate_lines_collapse_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(TAGS_FILE), "alpha\n\n  Beta \nalpha\nBETA\n")
            .expect("seed file");
        assert_eq!(load_tags(dir.path()).expect("load"), vec!["alpha", "beta"]);
    }

    #[test]
    fn whitespace_only_tag_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!add_tag(dir.path(), "   ").expect("blank tag"));
        assert!(load_tags(dir.path()).expect("load").is_empty());
    }
}
