use include_dir::{include_dir, Dir};
use rand::Rng;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

static SNIPPET_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/snippets");

const TAB_WIDTH: usize = 4;

/// Supplies the reference text for each new session.
pub trait SnippetProvider {
    fn next_snippet(&mut self) -> String;
}

/// Always hands out the same text. Used for `--prompt`.
#[derive(Debug, Clone)]
pub struct FixedSnippet(String);

impl FixedSnippet {
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(normalize_snippet(text.as_ref()))
    }
}

impl SnippetProvider for FixedSnippet {
    fn next_snippet(&mut self) -> String {
        self.0.clone()
    }
}

/// Picks a random snippet from a fixed set, avoiding an immediate repeat
/// when more than one is available.
#[derive(Debug, Clone)]
pub struct RandomSnippets {
    snippets: Vec<String>,
    last: Option<usize>,
}

impl RandomSnippets {
    /// The snippets compiled into the binary.
    pub fn builtin() -> Self {
        let mut files: Vec<_> = SNIPPET_DIR.files().collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));

        let snippets = files
            .into_iter()
            .filter_map(|f| f.contents_utf8())
            .map(normalize_snippet)
            .filter(|s| !s.is_empty())
            .collect();

        Self::from_snippets(snippets)
    }

    /// Every readable, non-empty file directly under `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let snippets: Vec<String> = paths
            .iter()
            .filter_map(|p| match fs::read_to_string(p) {
                Ok(text) => Some(normalize_snippet(&text)),
                Err(e) => {
                    log::warn!("skipping snippet {}: {}", p.display(), e);
                    None
                }
            })
            .filter(|s| !s.is_empty())
            .collect();

        if snippets.is_empty() {
            return Err(Error::NoSnippets(dir.to_path_buf()));
        }

        log::info!("loaded {} snippets from {}", snippets.len(), dir.display());
        Ok(Self::from_snippets(snippets))
    }

    pub fn from_snippets(snippets: Vec<String>) -> Self {
        Self {
            snippets,
            last: None,
        }
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

impl SnippetProvider for RandomSnippets {
    fn next_snippet(&mut self) -> String {
        match self.snippets.len() {
            0 => String::new(),
            1 => self.snippets[0].clone(),
            n => {
                let mut rng = rand::thread_rng();
                let mut idx = rng.gen_range(0..n);
                if Some(idx) == self.last {
                    idx = (idx + rng.gen_range(1..n)) % n;
                }
                self.last = Some(idx);
                self.snippets[idx].clone()
            }
        }
    }
}

/// Line endings become `\n`, tabs become spaces, trailing whitespace is
/// dropped from every line and from the end of the text.
pub fn normalize_snippet(text: &str) -> String {
    text.lines()
        .map(|line| line.replace('\t', &" ".repeat(TAB_WIDTH)))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_snippets_present_and_normalized() {
        let provider = RandomSnippets::builtin();
        assert!(provider.len() >= 2);
        for s in &provider.snippets {
            assert!(!s.contains('\t'));
            assert!(!s.contains('\r'));
            assert!(!s.ends_with('\n'));
        }
    }

    #[test]
    fn test_builtin_includes_react_components() {
        let provider = RandomSnippets::builtin();
        for component in ["const Button", "const Counter", "const Card"] {
            assert!(
                provider.snippets.iter().any(|s| s.contains(component)),
                "missing {component}"
            );
        }
    }

    #[test]
    fn test_random_never_repeats_back_to_back() {
        let mut provider =
            RandomSnippets::from_snippets(vec!["a".into(), "b".into(), "c".into()]);
        let mut prev = provider.next_snippet();
        for _ in 0..50 {
            let next = provider.next_snippet();
            assert_ne!(prev, next);
            prev = next;
        }
    }

    #[test]
    fn test_single_snippet_repeats() {
        let mut provider = RandomSnippets::from_snippets(vec!["only".into()]);
        assert_eq!(provider.next_snippet(), "only");
        assert_eq!(provider.next_snippet(), "only");
    }

    #[test]
    fn test_fixed_snippet() {
        let mut provider = FixedSnippet::new("let x = 1;\r\n");
        assert_eq!(provider.next_snippet(), "let x = 1;");
        assert_eq!(provider.next_snippet(), "let x = 1;");
    }

    #[test]
    fn test_normalize_snippet() {
        assert_eq!(
            normalize_snippet("fn a() {  \r\n\treturn;\r\n}\n\n"),
            "fn a() {\n    return;\n}"
        );
    }

    #[test]
    fn test_from_dir_reads_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "first\n").unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("empty.txt"), "  \n").unwrap();

        let provider = RandomSnippets::from_dir(dir.path()).unwrap();
        assert_eq!(provider.snippets, vec!["first", "second"]);
    }

    #[test]
    fn test_from_dir_without_snippets_errors() {
        let dir = tempdir().unwrap();
        let err = RandomSnippets::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoSnippets(_)));
    }

    #[test]
    fn test_from_missing_dir_errors() {
        let dir = tempdir().unwrap();
        let err = RandomSnippets::from_dir(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
