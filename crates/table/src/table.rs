//! The table handle.

use crate::commit::TableCommit;
use crate::read::TableRead;
use crate::schemas::{latest_schema, save_schema};
use crate::write::TableWrite;
use crate::TableError;
use anyhow::{Context, Result};
use config::{ChangelogProducer, CoreOptions, MergeEngine};
use manifest::SnapshotManager;
use mergefn::{AggregateOp, MergeFunction, SequenceGroup};
use row::Schema;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A primary-key table rooted at one directory.
///
/// The handle is cheap and immutable; writers, committers and readers
/// are created from it per use.
#[derive(Debug, Clone)]
pub struct Table {
    root: PathBuf,
    schema: Schema,
    options: CoreOptions,
}

impl Table {
    /// Creates a new table: writes `schema-0` and validates the options
    /// against the schema.
    pub fn create(
        root: &Path,
        schema: Schema,
        option_map: &BTreeMap<String, String>,
    ) -> Result<Table> {
        let options = CoreOptions::from_map(option_map)?;
        validate(&schema, &options)?;
        std::fs::create_dir_all(root)?;
        save_schema(root, &schema)?;
        SnapshotManager::new(root)?;
        info!(root = %root.display(), "created table");
        Ok(Table {
            root: root.to_path_buf(),
            schema,
            options,
        })
    }

    /// Opens an existing table, reading its newest schema.
    pub fn open(root: &Path, option_map: &BTreeMap<String, String>) -> Result<Table> {
        let options = CoreOptions::from_map(option_map)?;
        let schema = latest_schema(root)?
            .ok_or_else(|| TableError::Layout(format!("no table at {}", root.display())))?;
        validate(&schema, &options)?;
        Ok(Table {
            root: root.to_path_buf(),
            schema,
            options,
        })
    }

    /// The table root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The active schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The parsed options.
    #[must_use]
    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    /// The snapshot directory manager.
    pub fn snapshots(&self) -> Result<SnapshotManager> {
        Ok(SnapshotManager::new(&self.root)?)
    }

    /// Starts a write session.
    pub fn new_write(&self) -> Result<TableWrite> {
        TableWrite::new(self.clone())
    }

    /// Starts a write session for a full overwrite: no level
    /// restoration and a fresh global index, so it also serves as the
    /// bucket-rescale path.
    pub fn new_overwrite_write(&self) -> Result<TableWrite> {
        TableWrite::new_for_overwrite(self.clone())
    }

    /// Starts a committer for `user`.
    pub fn new_commit(&self, user: &str) -> Result<TableCommit> {
        TableCommit::new(self.clone(), user)
    }

    /// Starts a reader.
    #[must_use]
    pub fn new_read(&self) -> TableRead {
        TableRead::new(self.clone())
    }

    /// Rolls the table back to snapshot `id`; see
    /// [`SnapshotManager::rollback_to`].
    pub fn rollback_to(&self, id: u64) -> Result<()> {
        self.snapshots()?.rollback_to(id)?;
        Ok(())
    }

    /// Builds the merge-function factory implied by the schema and
    /// options. Resolution (field names to positions, aggregate op
    /// parsing) happens once, here; the factory itself is infallible.
    pub(crate) fn merge_factory(
        &self,
    ) -> Result<Arc<dyn Fn() -> MergeFunction + Send + Sync>> {
        match self.options.merge_engine {
            MergeEngine::Deduplicate => Ok(Arc::new(MergeFunction::deduplicate)),
            MergeEngine::FirstRow => Ok(Arc::new(MergeFunction::first_row)),
            MergeEngine::PartialUpdate => {
                let mut groups = Vec::new();
                for (gate, fields) in &self.options.sequence_groups {
                    let seq_field = self
                        .schema
                        .field_index(gate)
                        .with_context(|| format!("sequence-group gate '{gate}'"))?;
                    let mut positions = Vec::new();
                    for field in fields {
                        positions.push(
                            self.schema
                                .field_index(field)
                                .with_context(|| format!("sequence-group member '{field}'"))?,
                        );
                    }
                    groups.push(SequenceGroup {
                        seq_field,
                        fields: positions,
                    });
                }
                let ignore_delete = self.options.partial_update_ignore_delete;
                Ok(Arc::new(move || {
                    MergeFunction::partial_update(groups.clone(), ignore_delete)
                }))
            }
            MergeEngine::Aggregate => {
                let mut ops: Vec<Option<AggregateOp>> = vec![None; self.schema.fields.len()];
                for (field, op_name) in &self.options.aggregate_functions {
                    let position = self
                        .schema
                        .field_index(field)
                        .with_context(|| format!("aggregate field '{field}'"))?;
                    let op = AggregateOp::parse(op_name).ok_or_else(|| {
                        TableError::Unsupported(format!(
                            "aggregate function '{op_name}' for field '{field}'"
                        ))
                    })?;
                    ops[position] = Some(op);
                }
                Ok(Arc::new(move || MergeFunction::aggregate(ops.clone())))
            }
        }
    }
}

/// Cross-cutting schema/option validation at table construction.
fn validate(schema: &Schema, options: &CoreOptions) -> Result<()> {
    if schema.primary_keys.is_empty() {
        return Err(TableError::Unsupported(
            "tables without a primary key are outside the write engine's scope".to_string(),
        )
        .into());
    }
    if schema.trimmed_primary_key_projection()?.is_empty() {
        return Err(TableError::Unsupported(
            "primary key must contain at least one non-partition column".to_string(),
        )
        .into());
    }
    match options.changelog_producer {
        ChangelogProducer::None | ChangelogProducer::Input => {}
        other => {
            return Err(TableError::Unsupported(format!(
                "changelog producer {other:?} is not implemented by the core write path"
            ))
            .into())
        }
    }
    if let Some(field) = &options.sequence_field {
        schema.field_index(field)?;
    }
    for key in &options.bucket_key {
        schema.field_index(key)?;
    }
    Ok(())
}
