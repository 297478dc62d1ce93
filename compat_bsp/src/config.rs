use std::path::Path;

use serde::Deserialize;

use crate::error::{BspError, BspResult};
use crate::lump::DEFAULT_MAX_RECORDS;
use crate::map_type::MapType;

/// Options for opening maps, loadable from a TOML file:
///
/// ```toml
/// load_lump_files = true
/// map_type = "l4d2"
/// max_lump_records = 4000000
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReaderOptions {
    /// Apply `<map>_l_<n>.lmp` files found next to the map.
    #[serde(default = "default_true")]
    pub load_lump_files: bool,
    /// Skip detection and read as this variant.
    #[serde(default)]
    pub map_type: Option<String>,
    #[serde(default = "default_max_records")]
    pub max_lump_records: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            load_lump_files: true,
            map_type: None,
            max_lump_records: DEFAULT_MAX_RECORDS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReaderOptionsValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReaderOptionsValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ReaderOptions {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    /// Reads, parses and validates an options file. Warnings are logged.
    pub fn load(path: &Path) -> BspResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            BspError::MissingBackingFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let options = Self::parse_toml(&text).map_err(BspError::Config)?;
        let validation = options.validate();
        for warning in &validation.warnings {
            tracing::warn!(path = %path.display(), "{}", warning);
        }
        if !validation.is_ok() {
            return Err(BspError::Config(validation.errors.join("; ")));
        }
        Ok(options)
    }

    pub fn validate(&self) -> ReaderOptionsValidation {
        let mut validation = ReaderOptionsValidation::default();
        if let Some(name) = &self.map_type {
            match MapType::from_name(name) {
                None => validation
                    .errors
                    .push(format!("unknown map_type {:?}", name)),
                Some(tag) if tag.is_undefined() => validation
                    .errors
                    .push("map_type cannot be \"undefined\"".to_string()),
                Some(tag) if !MapType::CONCRETE.contains(&tag) => validation.warnings.push(
                    format!("map_type {} is a family, not a concrete variant", tag),
                ),
                Some(_) => {}
            }
        }
        if self.max_lump_records == 0 {
            validation
                .errors
                .push("max_lump_records must be greater than zero".to_string());
        }
        validation
    }

    /// The forced variant, if one is configured and valid.
    pub fn forced_map_type(&self) -> Option<MapType> {
        self.map_type
            .as_deref()
            .and_then(MapType::from_name)
            .filter(|tag| !tag.is_undefined())
    }
}
