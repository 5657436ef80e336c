//! Purchase lifecycle: quote, size, submit, confirm.
//!
//! The flow never writes to the replica. The replica converges through the
//! same notification path every other buyer's purchase takes, so what it
//! shows afterwards is the ledger-recorded outcome, not a local guess.

use crate::replica::Replica;
use crate::source::SubmitTransport;
use lattice_types::api::WriteRequest;
use lattice_types::pricing::{self, BudgetModel, PricingError};
use lattice_types::Color;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Rejections raised before anything leaves the process.
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("no selected cell to purchase")]
    NoSelection,
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Terminal failure of a flow that did reach the network.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PurchaseFailure {
    #[error("insufficient funds for the quoted cost")]
    InsufficientFunds,
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("confirmation failed: {0}")]
    Confirmation(String),
}

/// What a confirmed purchase bought, for history and receipts display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseRecord {
    pub tx: String,
    pub stage: usize,
    pub row: usize,
    pub col: usize,
    pub count: usize,
    pub color: Color,
    pub cost: u128,
    pub budget: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseState {
    Idle,
    Quoting,
    AwaitingSignature,
    Submitted,
    Confirmed(PurchaseRecord),
    Failed(PurchaseFailure),
    /// Neutral outcome: the user declined to sign, or cancelled before
    /// submission. Never an error.
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseEvent {
    /// The numbers for the confirmation prompt. `budget_from_model` is true
    /// when remote sizing failed and the local linear model was used.
    Quoted {
        cost: u128,
        budget: u64,
        budget_from_model: bool,
    },
    State(PurchaseState),
}

/// Drives one purchase at a time against the replica's current selection.
pub struct PurchaseFlow<S: SubmitTransport> {
    replica: Replica,
    submitter: S,
    stage_ids: Vec<String>,
    budget_model: BudgetModel,
    events: mpsc::Sender<PurchaseEvent>,
    cancel: watch::Receiver<bool>,
}

impl<S: SubmitTransport> PurchaseFlow<S> {
    pub fn new(
        replica: Replica,
        submitter: S,
        stage_ids: Vec<String>,
    ) -> (Self, watch::Sender<bool>, mpsc::Receiver<PurchaseEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                replica,
                submitter,
                stage_ids,
                budget_model: BudgetModel::default(),
                events: event_tx,
                cancel: cancel_rx,
            },
            cancel_tx,
            event_rx,
        )
    }

    pub fn budget_model(mut self, model: BudgetModel) -> Self {
        self.budget_model = model;
        self
    }

    /// Runs the full lifecycle for `count` layers of `color` on the selected
    /// cell and returns the terminal state.
    ///
    /// `Err` means the flow was rejected before any network call; any
    /// outcome of a flow that did run (including failures) comes back as
    /// `Ok` with the terminal [`PurchaseState`].
    pub async fn run(&self, count: usize, color: Color) -> Result<PurchaseState, PurchaseError> {
        self.emit(PurchaseState::Quoting).await;

        let selection = self.replica.selected().await.ok_or(PurchaseError::NoSelection)?;
        let cell = self
            .replica
            .cell(selection.stage, selection.row, selection.col)
            .await
            .ok_or(PurchaseError::NoSelection)?;
        let stage_id = self
            .stage_ids
            .get(selection.stage)
            .ok_or(PurchaseError::NoSelection)?
            .clone();

        let generation = cell.generation() as u64;
        let cost = pricing::quote(generation, count as u64, cell.base_value)?;

        if self.cancelled() {
            return Ok(self.emit(PurchaseState::Cancelled).await);
        }

        let write = WriteRequest {
            stage_id,
            row: selection.row,
            col: selection.col,
            count,
            color,
        };
        // Remote sizing first; the local model never fails the flow.
        let (budget, budget_from_model) = match self.submitter.estimate(&write).await {
            Ok(budget) => (budget, false),
            Err(err) => {
                debug!(error = %err, "remote estimate unavailable, using local budget model");
                (self.budget_model.estimate(generation, count as u64), true)
            }
        };
        let _ = self
            .events
            .send(PurchaseEvent::Quoted {
                cost,
                budget,
                budget_from_model,
            })
            .await;

        if self.cancelled() {
            return Ok(self.emit(PurchaseState::Cancelled).await);
        }
        self.emit(PurchaseState::AwaitingSignature).await;
        if self.cancelled() {
            return Ok(self.emit(PurchaseState::Cancelled).await);
        }

        // Past this point the write is in flight and can no longer be
        // cancelled locally.
        let receipt = match self.submitter.submit(&write, cost, budget).await {
            Ok(receipt) => receipt,
            Err(lattice_client::Error::UserDeclined) => {
                info!("signature declined, purchase cancelled");
                return Ok(self.emit(PurchaseState::Cancelled).await);
            }
            Err(lattice_client::Error::InsufficientFunds) => {
                return Ok(self.fail(PurchaseFailure::InsufficientFunds).await);
            }
            Err(err) => {
                return Ok(self.fail(PurchaseFailure::Submission(err.to_string())).await);
            }
        };
        info!(tx = receipt.tx.as_str(), "purchase submitted");
        self.emit(PurchaseState::Submitted).await;

        if let Err(err) = self.submitter.confirm(&receipt).await {
            return Ok(self.fail(PurchaseFailure::Confirmation(err.to_string())).await);
        }

        let record = PurchaseRecord {
            tx: receipt.tx,
            stage: selection.stage,
            row: selection.row,
            col: selection.col,
            count,
            color,
            cost,
            budget,
        };
        info!(
            tx = record.tx.as_str(),
            stage = record.stage,
            row = record.row,
            col = record.col,
            count,
            "purchase confirmed"
        );
        // The replica is left alone: the matching notification carries the
        // committed layers through the sync path.
        Ok(self.emit(PurchaseState::Confirmed(record)).await)
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn emit(&self, state: PurchaseState) -> PurchaseState {
        let _ = self.events.send(PurchaseEvent::State(state.clone())).await;
        state
    }

    async fn fail(&self, failure: PurchaseFailure) -> PurchaseState {
        warn!(%failure, "purchase failed");
        self.emit(PurchaseState::Failed(failure)).await
    }
}
