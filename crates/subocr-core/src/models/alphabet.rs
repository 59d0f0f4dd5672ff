//! Recognizer alphabets.

use std::path::Path;

use tracing::debug;

use crate::error::ModelError;

/// Characters the recognizer can emit.
///
/// Class 0 is the CTC blank; class `i` maps to the `i - 1`th character. A
/// space is always appended as the last character.
#[derive(Debug, Clone, PartialEq)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    /// Build from alphabet file contents. Line breaks are dropped, every
    /// other character is kept in order.
    pub fn new(text: &str) -> Self {
        let mut chars: Vec<char> = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        chars.push(' ');
        Self { chars }
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Alphabet {
            path: path.to_path_buf(),
            source,
        })?;
        if content.chars().all(|c| c == '\n' || c == '\r') {
            return Err(ModelError::EmptyAlphabet(path.to_path_buf()));
        }

        let alphabet = Self::new(&content);
        debug!("Loaded alphabet with {} characters from {}", alphabet.len(), path.display());
        Ok(alphabet)
    }

    /// Number of characters, including the appended space.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Recognizer output classes: every character plus the blank.
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    /// Character for a class index. `None` for the blank and out-of-range
    /// indices.
    pub fn get(&self, class: usize) -> Option<char> {
        class.checked_sub(1).and_then(|i| self.chars.get(i)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let alphabet = Alphabet::new("ab\nc\r\nde\n");
        assert_eq!(alphabet.len(), 6);
        assert_eq!(alphabet.num_classes(), 7);
        assert_eq!(alphabet.get(0), None);
        assert_eq!(alphabet.get(1), Some('a'));
        assert_eq!(alphabet.get(5), Some('e'));
        assert_eq!(alphabet.get(6), Some(' '));
        assert_eq!(alphabet.get(7), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en.txt");
        std::fs::write(&path, "0123456789\nabc\n").unwrap();
        let alphabet = Alphabet::from_file(&path).unwrap();
        assert_eq!(alphabet.len(), 14);

        std::fs::write(&path, "\n\n").unwrap();
        assert!(matches!(Alphabet::from_file(&path), Err(ModelError::EmptyAlphabet(_))));

        let missing = dir.path().join("xx.txt");
        assert!(matches!(Alphabet::from_file(&missing), Err(ModelError::Alphabet { .. })));
    }
}
