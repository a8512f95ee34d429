//! Preset complement groups, loaded from a JSON asset at startup.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use validator::Validate;

use crate::models::ComplementGroup;

#[derive(Debug, Error)]
pub enum DefaultsError {
    #[error("failed to read default groups from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed default groups in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid default group '{name}': {source}")]
    Invalid {
        name: String,
        #[source]
        source: validator::ValidationErrors,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DefaultGroups {
    groups: Vec<ComplementGroup>,
}

impl DefaultGroups {
    pub fn load(path: &Path) -> Result<Self, DefaultsError> {
        let raw = fs::read_to_string(path).map_err(|source| DefaultsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let groups: Vec<ComplementGroup> =
            serde_json::from_str(&raw).map_err(|source| DefaultsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let defaults = Self::new(groups)?;
        info!("Loaded {} default complement groups from {}", defaults.groups.len(), path.display());
        Ok(defaults)
    }

    pub fn new(groups: Vec<ComplementGroup>) -> Result<Self, DefaultsError> {
        for group in &groups {
            group.validate().map_err(|source| DefaultsError::Invalid {
                name: group.name.clone(),
                source,
            })?;
        }
        Ok(DefaultGroups { groups })
    }

    pub fn groups(&self) -> &[ComplementGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn asset_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default_complement_groups.json")
    }

    #[test]
    fn bundled_asset_loads() {
        let defaults = DefaultGroups::load(&asset_path()).unwrap();
        let groups = defaults.groups();
        assert_eq!(groups.len(), 7);
        assert_eq!(groups[0].name, "TIPO DE AÇAÍ (ESCOLHA 1 ITEM)");
        assert!(groups[0].required);
        assert_eq!(groups[2].max_items, 2);
        assert_eq!(groups[4].max_items, 10);
        assert!(groups[4].options.iter().all(|o| o.price > 0.0));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = DefaultGroups::load(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, DefaultsError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = DefaultGroups::load(file.path()).unwrap_err();
        assert!(matches!(err, DefaultsError::Parse { .. }));
    }

    #[test]
    fn template_violating_bounds_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"Broken","required":true,"min_items":0,"max_items":1,"options":[]}}]"#
        )
        .unwrap();
        let err = DefaultGroups::load(file.path()).unwrap_err();
        assert!(matches!(err, DefaultsError::Invalid { ref name, .. } if name == "Broken"));
    }
}
