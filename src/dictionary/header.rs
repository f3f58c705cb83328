//! Dictionary header: format version, locale and the ordered attribute map.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Attribute keys the header summary logs when a dictionary is opened.
pub const DICTIONARY_ID_KEY: &str = "dictionary";
pub const VERSION_KEY: &str = "version";
pub const DATE_KEY: &str = "date";

/// Persisted format versions this crate can create and open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Updatable trie dictionary without historical information.
    V4,
    /// Development revision of `V4` that also stores timestamps, levels and counts.
    V4Dev,
}

impl FormatVersion {
    pub const fn number(self) -> u32 {
        match self {
            FormatVersion::V4 => 4,
            FormatVersion::V4Dev => 403,
        }
    }

    pub const fn has_historical_info(self) -> bool {
        matches!(self, FormatVersion::V4Dev)
    }
}

impl TryFrom<u32> for FormatVersion {
    type Error = Error;

    fn try_from(number: u32) -> Result<Self> {
        match number {
            4 => Ok(FormatVersion::V4),
            403 => Ok(FormatVersion::V4Dev),
            other => Err(Error::UnsupportedFormatVersion(other)),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Header metadata copied verbatim across flushes and migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryHeader {
    format_version: FormatVersion,
    locale: String,
    attributes: BTreeMap<String, String>,
}

impl DictionaryHeader {
    pub fn new(
        format_version: FormatVersion,
        locale: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            format_version,
            locale: locale.into(),
            attributes,
        }
    }

    #[inline]
    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    #[inline]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[inline]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The same locale and attributes at another format version.
    pub fn with_format_version(&self, format_version: FormatVersion) -> Self {
        Self {
            format_version,
            ..self.clone()
        }
    }

    /// One-line `dictionary / version / date` summary, `?` for missing values.
    pub fn summary(&self) -> String {
        let or_question_mark = |key| self.attribute(key).unwrap_or("?");
        format!(
            "dictionary = {} ; version = {} ; date = {}",
            or_question_mark(DICTIONARY_ID_KEY),
            or_question_mark(VERSION_KEY),
            or_question_mark(DATE_KEY)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version_numbers() {
        assert_eq!(FormatVersion::try_from(4).unwrap(), FormatVersion::V4);
        assert_eq!(FormatVersion::try_from(403).unwrap(), FormatVersion::V4Dev);
        assert!(matches!(
            FormatVersion::try_from(2),
            Err(Error::UnsupportedFormatVersion(2))
        ));
        assert!(FormatVersion::V4Dev.has_historical_info());
        assert!(!FormatVersion::V4.has_historical_info());
    }

    #[test]
    fn test_summary_marks_missing_attributes() {
        let mut attributes = BTreeMap::new();
        attributes.insert(DICTIONARY_ID_KEY.to_string(), "main:en_US".to_string());
        attributes.insert(DATE_KEY.to_string(), "1400000000".to_string());
        let header = DictionaryHeader::new(FormatVersion::V4, "en_US", attributes);
        assert_eq!(
            header.summary(),
            "dictionary = main:en_US ; version = ? ; date = 1400000000"
        );
        let migrated = header.with_format_version(FormatVersion::V4Dev);
        assert_eq!(migrated.locale(), "en_US");
        assert_eq!(migrated.attributes(), header.attributes());
    }
}
