//! Golden-data snapshot comparison for JSON payloads.
//!
//! Goldens live in a [`GoldenStore`] directory as zstd-compressed Parquet files.
//! A [`SnapshotComparator`] loads one, drops volatile fields from both sides and
//! reports every structural difference.

use serde_json::Value;
use std::path::PathBuf;

pub mod diff;
pub mod golden;

pub use diff::{Difference, Tolerance, diff_values, strip_fields};
pub use golden::{GoldenFile, GoldenStore};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("No golden snapshot named `{name}` at {}", path.display())]
    NotFound { name: String, path: PathBuf },
    #[error("Snapshot `{name}` does not match:\n{}", format_differences(differences))]
    Mismatch {
        name: String,
        differences: Vec<Difference>,
    },
    #[error("Golden snapshot `{name}` is malformed: {reason}")]
    Malformed { name: String, reason: String },
    #[error("Cannot encode golden snapshot `{name}`: {source}")]
    Encode {
        name: String,
        #[source]
        source: parquet::errors::ParquetError,
    },
    #[error("Cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_differences(differences: &[Difference]) -> String {
    differences
        .iter()
        .map(|difference| format!("  {difference}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct SnapshotComparator {
    store: GoldenStore,
    tolerance: Tolerance,
}

impl SnapshotComparator {
    pub fn new(store: GoldenStore) -> Self {
        Self {
            store,
            tolerance: Tolerance::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn store(&self) -> &GoldenStore {
        &self.store
    }

    /// Compares `actual` with the golden named `snapshot_name`, ignoring
    /// `exclude_fields` on both sides. A mismatch lists every divergent path.
    pub fn assert_matches_snapshot(
        &self,
        actual: &Value,
        snapshot_name: &str,
        exclude_fields: &[&str],
    ) -> Result<(), SnapshotError> {
        let expected = self.store.load(snapshot_name)?;
        let differences = diff_values(
            &strip_fields(&expected, exclude_fields),
            &strip_fields(actual, exclude_fields),
            self.tolerance,
        );
        if differences.is_empty() {
            Ok(())
        } else {
            Err(SnapshotError::Mismatch {
                name: snapshot_name.to_string(),
                differences,
            })
        }
    }

    /// Records `payload` as the golden named `snapshot_name`.
    pub fn create_snapshot(
        &self,
        payload: &Value,
        snapshot_name: &str,
    ) -> Result<PathBuf, SnapshotError> {
        self.store.save(snapshot_name, payload)
    }
}
