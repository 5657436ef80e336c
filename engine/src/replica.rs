//! The in-memory grid replica: process-wide state with one logical writer.

use lattice_types::{Address, Cell, Color, Layer, Selection, Snapshot, Stage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// A notification or intent addressed a coordinate the replica does not
/// know about. Logged and dropped by callers, never fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRange {
    #[error("unknown stage {stage}")]
    Stage { stage: usize },
    #[error("no cell at stage {stage}, row {row}, col {col}")]
    Cell {
        stage: usize,
        row: usize,
        col: usize,
    },
}

/// Plain replica state. All access goes through [`Replica`]; mutation is
/// reserved to the sync engine so stages are never observed half-applied.
#[derive(Debug, Default)]
pub struct GridReplica {
    stages: Vec<Stage>,
    total_values: Vec<u128>,
    selection: Option<Selection>,
}

impl GridReplica {
    /// Wholesale replacement, bootstrap only. Grids never resize through
    /// any other path, and layers only ever grow via [`Self::append_layers`].
    pub fn install(&mut self, snapshot: Snapshot) {
        self.stages = snapshot.stages;
        self.total_values = snapshot.total_values;
        if let Some(selection) = self.selection {
            if self
                .cell(selection.stage, selection.row, selection.col)
                .is_none()
            {
                self.selection = None;
            }
        }
    }

    pub fn cell(&self, stage: usize, row: usize, col: usize) -> Option<&Cell> {
        self.stages
            .get(stage)
            .and_then(|stage| stage.cells.as_ref())
            .and_then(|cells| cells.get(row, col))
    }

    /// The only mutation path after bootstrap: appends `count` layers with
    /// one owner and color. On any bad index the replica is untouched.
    pub fn append_layers(
        &mut self,
        stage: usize,
        row: usize,
        col: usize,
        count: usize,
        owner: Address,
        color: Color,
    ) -> Result<(), OutOfRange> {
        let cell = self
            .stages
            .get_mut(stage)
            .and_then(|stage| stage.cells.as_mut())
            .and_then(|cells| cells.get_mut(row, col))
            .ok_or(OutOfRange::Cell { stage, row, col })?;
        cell.layers.extend(
            std::iter::repeat_with(|| Layer {
                owner: owner.clone(),
                color,
            })
            .take(count),
        );
        Ok(())
    }

    pub fn set_total_value(&mut self, stage: usize, value: u128) -> Result<(), OutOfRange> {
        let slot = self
            .total_values
            .get_mut(stage)
            .ok_or(OutOfRange::Stage { stage })?;
        *slot = value;
        Ok(())
    }

    pub fn total_value(&self, stage: usize) -> Option<u128> {
        self.total_values.get(stage).copied()
    }

    pub fn select(&mut self, stage: usize, row: usize, col: usize) -> Result<(), OutOfRange> {
        if self.cell(stage, row, col).is_none() {
            return Err(OutOfRange::Cell { stage, row, col });
        }
        self.selection = Some(Selection { stage, row, col });
        Ok(())
    }

    pub fn selected(&self) -> Option<Selection> {
        self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            stages: self.stages.clone(),
            total_values: self.total_values.clone(),
        }
    }
}

/// Shared handle to the process-wide replica. Created empty at startup,
/// populated by the first bootstrap, lives for the process lifetime.
///
/// Write operations are crate-private: every mutation is serialized through
/// the sync engine task, so concurrent readers always observe fully-formed
/// stages. Selection is presentation-driven and goes through the same lock.
#[derive(Clone, Debug, Default)]
pub struct Replica {
    inner: Arc<RwLock<GridReplica>>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn cell(&self, stage: usize, row: usize, col: usize) -> Option<Cell> {
        self.inner.read().await.cell(stage, row, col).cloned()
    }

    pub async fn total_value(&self, stage: usize) -> Option<u128> {
        self.inner.read().await.total_value(stage)
    }

    pub async fn select(&self, stage: usize, row: usize, col: usize) -> Result<(), OutOfRange> {
        self.inner.write().await.select(stage, row, col)
    }

    pub async fn selected(&self) -> Option<Selection> {
        self.inner.read().await.selected()
    }

    pub async fn clear_selection(&self) {
        self.inner.write().await.clear_selection();
    }

    pub(crate) async fn install(&self, snapshot: Snapshot) {
        self.inner.write().await.install(snapshot);
    }

    pub(crate) async fn append_layers(
        &self,
        stage: usize,
        row: usize,
        col: usize,
        count: usize,
        owner: Address,
        color: Color,
    ) -> Result<(), OutOfRange> {
        self.inner
            .write()
            .await
            .append_layers(stage, row, col, count, owner, color)
    }

    pub(crate) async fn set_total_value(
        &self,
        stage: usize,
        value: u128,
    ) -> Result<(), OutOfRange> {
        self.inner.write().await.set_total_value(stage, value)
    }
}
