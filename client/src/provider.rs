use crate::{parse_base, Error, Result};
use lattice_types::api::NetworkInfo;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Default bound on a single liveness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One read-transport candidate in the failover chain.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub url: Url,
}

impl Candidate {
    pub fn new(name: impl Into<String>, url: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: parse_base(url, "http|https")?,
        })
    }
}

/// A probed, working read endpoint.
#[derive(Clone, Debug)]
pub struct Provider {
    pub(crate) name: String,
    pub(crate) base: Url,
    pub(crate) http: reqwest::Client,
    pub(crate) chain_id: u64,
}

impl Provider {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Outcome of probing one candidate. A `Skip` is expected (the endpoint is
/// disabled for this key) and surfaces no error; a `Fail` is logged and the
/// next candidate is tried.
enum Probe {
    Ok(Provider),
    Skip(String),
    Fail(String),
}

/// Selects a working read endpoint from an ordered candidate list.
///
/// Stateless per call: every `resolve` re-probes from the top of the chain,
/// so recovery after an `Unavailable` needs no cache invalidation.
#[derive(Clone, Debug)]
pub struct Resolver {
    candidates: Vec<Candidate>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl Resolver {
    pub fn new(candidates: Vec<Candidate>, probe_timeout: Duration) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }
        Ok(Self {
            candidates,
            http: reqwest::Client::new(),
            probe_timeout,
        })
    }

    /// Probe candidates in order and return the first that answers the
    /// network identity query.
    pub async fn resolve(&self) -> Result<Provider> {
        for candidate in &self.candidates {
            match self.probe(candidate).await {
                Probe::Ok(provider) => {
                    debug!(
                        provider = provider.name.as_str(),
                        chain_id = provider.chain_id,
                        "resolved read provider"
                    );
                    return Ok(provider);
                }
                Probe::Skip(reason) => {
                    debug!(
                        provider = candidate.name.as_str(),
                        reason, "endpoint disabled for this key, skipping"
                    );
                }
                Probe::Fail(reason) => {
                    warn!(
                        provider = candidate.name.as_str(),
                        reason, "provider probe failed"
                    );
                }
            }
        }
        Err(Error::Unavailable)
    }

    async fn probe(&self, candidate: &Candidate) -> Probe {
        let url = match candidate.url.join("network") {
            Ok(url) => url,
            Err(err) => return Probe::Fail(err.to_string()),
        };
        let response = match timeout(self.probe_timeout, self.http.get(url).send()).await {
            Err(_) => return Probe::Fail("probe timed out".to_string()),
            Ok(Err(err)) => return Probe::Fail(err.to_string()),
            Ok(Ok(response)) => response,
        };
        match response.status() {
            reqwest::StatusCode::FORBIDDEN => Probe::Skip("403".to_string()),
            status if status.is_success() => match response.json::<NetworkInfo>().await {
                Ok(info) => Probe::Ok(Provider {
                    name: candidate.name.clone(),
                    base: candidate.url.clone(),
                    http: self.http.clone(),
                    chain_id: info.chain_id,
                }),
                Err(err) => Probe::Fail(format!("bad identity response: {err}")),
            },
            status => Probe::Fail(format!("status {status}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve_router;
    use axum::{extract::State as AxumState, http::StatusCode, routing::get, Json, Router};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::time::{sleep, Duration};

    fn network_ok(chain_id: u64) -> Json<NetworkInfo> {
        Json(NetworkInfo { chain_id })
    }

    #[tokio::test]
    async fn skips_disabled_endpoint_silently_and_picks_next() {
        let router = Router::new()
            .route("/a/network", get(|| async { StatusCode::FORBIDDEN }))
            .route("/b/network", get(|| async { network_ok(137) }));
        let (base, handle) = serve_router(router).await;

        let resolver = Resolver::new(
            vec![
                Candidate::new("disabled", &format!("{base}/a")).unwrap(),
                Candidate::new("working", &format!("{base}/b")).unwrap(),
            ],
            DEFAULT_PROBE_TIMEOUT,
        )
        .unwrap();

        let provider = resolver.resolve().await.unwrap();
        assert_eq!(provider.name(), "working");
        assert_eq!(provider.chain_id(), 137);

        handle.abort();
    }

    #[tokio::test]
    async fn falls_through_failures_in_order() {
        let router = Router::new()
            .route("/a/network", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/b/network", get(|| async { "not json" }))
            .route("/c/network", get(|| async { network_ok(1) }));
        let (base, handle) = serve_router(router).await;

        let resolver = Resolver::new(
            vec![
                Candidate::new("bad-status", &format!("{base}/a")).unwrap(),
                Candidate::new("bad-body", &format!("{base}/b")).unwrap(),
                Candidate::new("ok", &format!("{base}/c")).unwrap(),
            ],
            DEFAULT_PROBE_TIMEOUT,
        )
        .unwrap();

        assert_eq!(resolver.resolve().await.unwrap().name(), "ok");

        handle.abort();
    }

    #[tokio::test]
    async fn unavailable_when_all_candidates_fail() {
        let router =
            Router::new().route("/network", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let (base, handle) = serve_router(router).await;

        let resolver = Resolver::new(
            vec![Candidate::new("only", &base).unwrap()],
            DEFAULT_PROBE_TIMEOUT,
        )
        .unwrap();

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable));

        handle.abort();
    }

    #[tokio::test]
    async fn bounded_probe_timeout_moves_to_next_candidate() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/slow/network",
                get(|AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_secs(5)).await;
                    network_ok(1)
                }),
            )
            .route("/fast/network", get(|| async { network_ok(2) }))
            .with_state(counter.clone());
        let (base, handle) = serve_router(router).await;

        let resolver = Resolver::new(
            vec![
                Candidate::new("slow", &format!("{base}/slow")).unwrap(),
                Candidate::new("fast", &format!("{base}/fast")).unwrap(),
            ],
            Duration::from_millis(100),
        )
        .unwrap();

        let provider = resolver.resolve().await.unwrap();
        assert_eq!(provider.name(), "fast");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[test]
    fn rejects_empty_candidate_list() {
        let err = Resolver::new(vec![], DEFAULT_PROBE_TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::NoCandidates));
    }
}
