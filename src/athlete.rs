//! Athlete information sheet
//!
//! Plain text, one `key: value` pair per line. The first colon splits key
//! from value; lines without a colon are ignored. Keys are free-form and are
//! copied verbatim into the report, in file order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteInfo {
    entries: Vec<(String, String)>,
}

impl AthleteInfo {
    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                info.insert(key.trim(), value.trim());
            }
        }
        info
    }

    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Set a value; a repeated key keeps its first position and takes the new value
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_info_sheet() {
        let info = AthleteInfo::parse(
            "Nom: Dupont\n\
             Date du test: 2024-03-12 10:30\n\
             no colon here\n\
             Poids :  72 kg \n",
        );

        assert_eq!(
            info.entries(),
            &[
                ("Nom".to_string(), "Dupont".to_string()),
                ("Date du test".to_string(), "2024-03-12 10:30".to_string()),
                ("Poids".to_string(), "72 kg".to_string()),
            ]
        );
    }

    #[test]
    fn test_repeated_key_overwrites_in_place() {
        let info = AthleteInfo::parse("Club: A\nNom: B\nClub: C\n");
        assert_eq!(info.get("Club"), Some("C"));
        assert_eq!(info.entries()[0].0, "Club");
        assert_eq!(info.entries().len(), 2);
    }

    #[test]
    fn test_empty_sheet() {
        assert!(AthleteInfo::parse("\n\n").is_empty());
    }
}
