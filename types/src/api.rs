//! Wire types for the read, notification, and submission transports.

use crate::{amount, Address, Color, Grid};
use serde::{Deserialize, Serialize};

/// Response to the liveness probe (`GET /network`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub chain_id: u64,
}

/// `GET /stage/{id}/enabled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledResponse {
    pub enabled: bool,
}

/// `GET /stage/{id}/cells`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellsResponse {
    pub cells: Grid,
}

/// `GET /stage/{id}/value`. The aggregate is the ledger's own accounting
/// and is never recomputed client-side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueResponse {
    #[serde(with = "amount")]
    pub total: u128,
}

/// Push event describing a change already committed at the source,
/// delivered per stage over the notification transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    LayersPurchased {
        buyer: Address,
        row: usize,
        col: usize,
        count: usize,
        color: Color,
    },
    StageEnabled,
}

/// A write to be sized and submitted through the signing transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub stage_id: String,
    pub row: usize,
    pub col: usize,
    pub count: usize,
    pub color: Color,
}

/// Body of `POST /submit`: the write plus the funds to transfer and the
/// resource ceiling, both computed off-chain before submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(flatten)]
    pub write: WriteRequest,
    #[serde(with = "amount")]
    pub value: u128,
    pub budget: u64,
}

/// `POST /estimate` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub budget: u64,
}

/// Acknowledgment that a submission was accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx: String,
}

/// `GET /receipt/{tx}` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptStatus {
    pub confirmed: bool,
}

/// Error body returned by the signing transport on a rejected submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl SubmitErrorBody {
    pub const USER_DECLINED: &'static str = "user_declined";
    pub const INSUFFICIENT_FUNDS: &'static str = "insufficient_funds";
}
