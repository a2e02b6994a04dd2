//! Schema persistence: `schema/schema-<id>` JSON files.

use crate::paths::schema_dir;
use anyhow::{Context, Result};
use row::Schema;
use std::fs;
use std::path::Path;

/// Writes a schema file; refuses to overwrite an existing id.
pub fn save_schema(root: &Path, schema: &Schema) -> Result<()> {
    let dir = schema_dir(root);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("schema-{}", schema.id));
    if path.exists() {
        anyhow::bail!("schema {} already exists at {}", schema.id, path.display());
    }
    let json = serde_json::to_string_pretty(schema)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Loads the highest-id schema, `None` for a fresh directory.
pub fn latest_schema(root: &Path) -> Result<Option<Schema>> {
    let dir = schema_dir(root);
    if !dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<(u64, std::path::PathBuf)> = None;
    for entry in fs::read_dir(&dir)?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(id) = name.strip_prefix("schema-").and_then(|s| s.parse::<u64>().ok()) else {
            continue;
        };
        if latest.as_ref().map(|(i, _)| id > *i).unwrap_or(true) {
            latest = Some((id, path));
        }
    }
    match latest {
        Some((_, path)) => {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("failed to read schema at {}", path.display()))?;
            let schema = serde_json::from_str(&json)
                .with_context(|| format!("corrupt schema at {}", path.display()))?;
            Ok(Some(schema))
        }
        None => Ok(None),
    }
}
