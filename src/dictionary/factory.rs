//! Construction entry points for dictionary structures.

use std::collections::BTreeMap;
use std::path::Path;

use log::{error, info};

use crate::config::StructureConfig;
use crate::error::Result;

use super::header::{DictionaryHeader, FormatVersion};
use super::policy::StructurePolicy;
use super::structure::TrieDictionary;

/// Opens the image stored at `path`, `size` bytes from `offset` (`size == 0` reads
/// to the end of the file).
pub fn open_existing(
    path: impl AsRef<Path>,
    offset: usize,
    size: usize,
    updatable: bool,
    config: &StructureConfig,
) -> Result<Box<dyn StructurePolicy>> {
    let path = path.as_ref();
    match TrieDictionary::open(path, offset, size, updatable, config.clone()) {
        Ok(dict) => Ok(Box::new(dict)),
        Err(e) => {
            error!("cannot open dictionary {}: {e}", path.display());
            Err(e)
        }
    }
}

/// Creates an empty, updatable structure at `format_version`.
pub fn create_on_memory(
    format_version: u32,
    locale: &str,
    attributes: BTreeMap<String, String>,
    config: &StructureConfig,
) -> Result<Box<dyn StructurePolicy>> {
    let format_version = FormatVersion::try_from(format_version)?;
    info!("creating on-memory dictionary (version {format_version}, locale {locale:?})");
    let header = DictionaryHeader::new(format_version, locale, attributes);
    Ok(Box::new(TrieDictionary::new(header, config.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_create_on_memory_versions() {
        let config = StructureConfig::default();
        let dict = create_on_memory(403, "de", BTreeMap::new(), &config).unwrap();
        assert_eq!(dict.header().format_version(), FormatVersion::V4Dev);
        assert_eq!(dict.header().locale(), "de");
        assert!(dict.is_updatable());

        assert!(matches!(
            create_on_memory(3, "de", BTreeMap::new(), &config),
            Err(Error::UnsupportedFormatVersion(3))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_existing(dir.path().join("absent"), 0, 0, true, &StructureConfig::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
