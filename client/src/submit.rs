//! Signing/submission transport.
//!
//! `estimate` asks the remote side to simulate the write; callers fall back
//! to the local budget model when it is unsupported. `submit` transfers the
//! quoted value with the budget as the resource ceiling; a declined
//! signature and insufficient funds are classified distinctly so the caller
//! can react without parsing strings.

use crate::{parse_base, Error, Result};
use lattice_types::api::{
    EstimateResponse, Receipt, ReceiptStatus, SubmitErrorBody, Submission, WriteRequest,
};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Submitter {
    base: Url,
    http: reqwest::Client,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl Submitter {
    pub fn new(base: &str) -> Result<Self> {
        Ok(Self {
            base: parse_base(base, "http|https")?,
            http: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        })
    }

    pub fn with_confirmation(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.confirm_timeout = timeout;
        self
    }

    /// Remote simulation of the write's resource use. May be unsupported.
    pub async fn estimate(&self, write: &WriteRequest) -> Result<u64> {
        let url = self.base.join("estimate")?;
        let response = self.http.post(url).json(write).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_IMPLEMENTED | reqwest::StatusCode::NOT_FOUND => {
                Err(Error::EstimateUnsupported)
            }
            status if status.is_success() => {
                Ok(response.json::<EstimateResponse>().await?.budget)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::FailedWithBody { status, body })
            }
        }
    }

    /// Hand the write to the signer with `value` to transfer and `budget`
    /// as the resource ceiling.
    pub async fn submit(&self, write: &WriteRequest, value: u128, budget: u64) -> Result<Receipt> {
        let submission = Submission {
            write: write.clone(),
            value,
            budget,
        };
        let url = self.base.join("submit")?;
        let response = self.http.post(url).json(&submission).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        if let Ok(rejection) = serde_json::from_str::<SubmitErrorBody>(&body) {
            match rejection.code.as_str() {
                SubmitErrorBody::USER_DECLINED => return Err(Error::UserDeclined),
                SubmitErrorBody::INSUFFICIENT_FUNDS => return Err(Error::InsufficientFunds),
                _ => {}
            }
        }
        Err(Error::FailedWithBody { status, body })
    }

    /// Poll until the transport acknowledges the receipt as confirmed,
    /// bounded by the configured total wait.
    pub async fn confirm(&self, receipt: &Receipt) -> Result<()> {
        let url = self.base.join(&format!("receipt/{}", receipt.tx))?;
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let response = self.http.get(url.clone()).send().await?;
            match response.status() {
                status if status.is_success() => {
                    let status: ReceiptStatus = response.json().await?;
                    if status.confirmed {
                        return Ok(());
                    }
                }
                // Not indexed yet; keep polling.
                reqwest::StatusCode::NOT_FOUND => {}
                status => return Err(Error::Failed(status)),
            }
            if Instant::now() + self.poll_interval >= deadline {
                return Err(Error::ConfirmationTimeout(receipt.tx.clone()));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve_router;
    use axum::{
        extract::State as AxumState,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use lattice_types::Color;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn write() -> WriteRequest {
        WriteRequest {
            stage_id: "0xs0".to_string(),
            row: 1,
            col: 2,
            count: 2,
            color: Color::rgb(0xab, 0xcd, 0xef),
        }
    }

    fn rejection(code: &str) -> (StatusCode, String) {
        (
            StatusCode::BAD_REQUEST,
            serde_json::to_string(&SubmitErrorBody {
                code: code.to_string(),
                message: String::new(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn estimate_round_trips_and_maps_unsupported() {
        let router = Router::new().route(
            "/a/estimate",
            post(|| async { Json(EstimateResponse { budget: 700_000 }) }),
        );
        let (base, handle) = serve_router(router).await;

        let supported = Submitter::new(&format!("{base}/a")).unwrap();
        assert_eq!(supported.estimate(&write()).await.unwrap(), 700_000);

        // No /estimate route: the 404 means the remote side cannot simulate.
        let unsupported = Submitter::new(&format!("{base}/b")).unwrap();
        let err = unsupported.estimate(&write()).await.unwrap_err();
        assert!(matches!(err, Error::EstimateUnsupported));

        handle.abort();
    }

    #[tokio::test]
    async fn submit_classifies_rejections() {
        let router = Router::new()
            .route("/declined/submit", post(|| async { rejection("user_declined") }))
            .route(
                "/broke/submit",
                post(|| async { rejection("insufficient_funds") }),
            )
            .route(
                "/other/submit",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nonce gap") }),
            )
            .route(
                "/ok/submit",
                post(|Json(submission): Json<Submission>| async move {
                    assert_eq!(submission.value, 200);
                    assert_eq!(submission.budget, 618_000);
                    Json(Receipt {
                        tx: "0xreceipt".to_string(),
                    })
                }),
            );
        let (base, handle) = serve_router(router).await;

        let declined = Submitter::new(&format!("{base}/declined")).unwrap();
        assert!(matches!(
            declined.submit(&write(), 200, 618_000).await.unwrap_err(),
            Error::UserDeclined
        ));

        let broke = Submitter::new(&format!("{base}/broke")).unwrap();
        assert!(matches!(
            broke.submit(&write(), 200, 618_000).await.unwrap_err(),
            Error::InsufficientFunds
        ));

        let other = Submitter::new(&format!("{base}/other")).unwrap();
        let err = other.submit(&write(), 200, 618_000).await.unwrap_err();
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "nonce gap");

        let ok = Submitter::new(&format!("{base}/ok")).unwrap();
        let receipt = ok.submit(&write(), 200, 618_000).await.unwrap();
        assert_eq!(receipt.tx, "0xreceipt");

        handle.abort();
    }

    #[tokio::test]
    async fn confirm_polls_until_confirmed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/receipt/0xreceipt",
                get(|AxumState(attempts): AxumState<Arc<AtomicUsize>>| async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    Json(ReceiptStatus {
                        confirmed: attempt >= 2,
                    })
                }),
            )
            .with_state(attempts.clone());
        let (base, handle) = serve_router(router).await;

        let submitter = Submitter::new(&base)
            .unwrap()
            .with_confirmation(Duration::from_millis(10), Duration::from_secs(5));
        submitter
            .confirm(&Receipt {
                tx: "0xreceipt".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn confirm_times_out() {
        let router = Router::new().route(
            "/receipt/0xreceipt",
            get(|| async { Json(ReceiptStatus { confirmed: false }) }),
        );
        let (base, handle) = serve_router(router).await;

        let submitter = Submitter::new(&base)
            .unwrap()
            .with_confirmation(Duration::from_millis(10), Duration::from_millis(30));
        let err = submitter
            .confirm(&Receipt {
                tx: "0xreceipt".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationTimeout(tx) if tx == "0xreceipt"));

        handle.abort();
    }
}
