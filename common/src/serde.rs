use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::file_format::SerdeFormat;
use crate::file_utils::ensure_parent_dir;

pub type Result<T> = anyhow::Result<T>;

pub fn serialize<T: Serialize>(value: &T, format: SerdeFormat) -> Result<String> {
    let text = match format {
        SerdeFormat::Yaml => serde_yml::to_string(value)?,
        SerdeFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(serialized: &str, format: SerdeFormat) -> Result<T> {
    match format {
        SerdeFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        SerdeFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads a file and deserializes it, picking the format from the extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = SerdeFormat::from_file_name(path)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    deserialize(&text, format).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Serializes `value` into `path`, creating the parent directory if needed.
///
/// Maps keyed by `BTreeMap` come out sorted, so repeated runs produce identical files.
pub fn dump_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let format = SerdeFormat::from_file_name(path)?;
    let text = serialize(value, format)?;
    ensure_parent_dir(path)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
