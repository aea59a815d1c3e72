use crate::error::ArtifactError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Placeholder the lookup emits for index 0
pub const UNKNOWN: &str = "[UNK]";

/// Ordered character set shared by training and inference.
///
/// Class layout: index 0 is the reserved unknown symbol, characters occupy
/// `1..=len`, and the CTC blank is the last class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    characters: Vec<char>,
}

impl Alphabet {
    pub fn new(characters: Vec<char>) -> Result<Self, ArtifactError> {
        if characters.is_empty() {
            return Err(ArtifactError::InvalidAlphabet(
                "alphabet has no characters".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for c in &characters {
            if !seen.insert(*c) {
                return Err(ArtifactError::InvalidAlphabet(format!(
                    "duplicate character {:?}",
                    c
                )));
            }
        }
        Ok(Self { characters })
    }

    /// Load the companion character list written next to the model
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let entries: Vec<String> =
            serde_json::from_str(&contents).map_err(|source| ArtifactError::AlphabetFormat {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_entries(&entries)
    }

    /// Build from string entries that must each hold exactly one character
    pub fn from_entries(entries: &[String]) -> Result<Self, ArtifactError> {
        let mut characters = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut chars = entry.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => characters.push(c),
                _ => {
                    return Err(ArtifactError::InvalidAlphabet(format!(
                        "entry {:?} is not a single character",
                        entry
                    )));
                }
            }
        }
        Self::new(characters)
    }

    /// Number of characters, excluding the unknown symbol
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Lookup vocabulary size (characters plus the unknown symbol)
    pub fn vocabulary_size(&self) -> usize {
        self.characters.len() + 1
    }

    /// Classes the model must emit per time step
    pub fn num_classes(&self) -> usize {
        self.vocabulary_size() + 1
    }

    /// Index of the CTC blank class
    pub fn blank(&self) -> usize {
        self.vocabulary_size()
    }

    /// Character for a class index; `None` for the unknown symbol, the blank, or out of range
    pub fn char_for(&self, class: usize) -> Option<char> {
        if class == 0 {
            return None;
        }
        self.characters.get(class - 1).copied()
    }

    /// Class index of a character, 0 (unknown) if it is not in the alphabet
    pub fn class_of(&self, c: char) -> usize {
        self.characters
            .iter()
            .position(|x| *x == c)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn characters(&self) -> &[char] {
        &self.characters
    }
}
