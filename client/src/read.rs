//! Read transport: stage enablement, cell grids, and aggregate values.

use crate::{provider::Provider, Error, Result};
use lattice_types::api::{CellsResponse, EnabledResponse, ValueResponse};
use lattice_types::Grid;
use serde::de::DeserializeOwned;

impl Provider {
    pub async fn get_enabled(&self, stage_id: &str) -> Result<bool> {
        let response: EnabledResponse = self
            .get(stage_id, &format!("stage/{stage_id}/enabled"))
            .await?;
        Ok(response.enabled)
    }

    pub async fn get_all_cells(&self, stage_id: &str) -> Result<Grid> {
        let response: CellsResponse = self
            .get(stage_id, &format!("stage/{stage_id}/cells"))
            .await?;
        Ok(response.cells)
    }

    /// The ledger's own aggregate for a stage. Taken verbatim, never
    /// recomputed locally: per-layer pricing must match the ledger's own
    /// accounting exactly.
    pub async fn get_aggregate_value(&self, stage_id: &str) -> Result<u128> {
        let response: ValueResponse = self
            .get(stage_id, &format!("stage/{stage_id}/value"))
            .await?;
        Ok(response.total)
    }

    async fn get<T: DeserializeOwned>(&self, stage_id: &str, path: &str) -> Result<T> {
        let url = self.base.join(path)?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(Error::UnknownStage(stage_id.to_string())),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                serde_json::from_slice(&bytes).map_err(Error::InvalidData)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::FailedWithBody { status, body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Candidate, Resolver, DEFAULT_PROBE_TIMEOUT};
    use crate::testutil::serve_router;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use lattice_types::api::NetworkInfo;

    async fn provider_for(base: &str) -> Provider {
        Resolver::new(
            vec![Candidate::new("test", base).unwrap()],
            DEFAULT_PROBE_TIMEOUT,
        )
        .unwrap()
        .resolve()
        .await
        .unwrap()
    }

    fn with_network(router: Router) -> Router {
        router.route(
            "/network",
            get(|| async { Json(NetworkInfo { chain_id: 7 }) }),
        )
    }

    #[tokio::test]
    async fn reads_round_trip() {
        let grid = Grid::filled(2, 2, 100).unwrap();
        let grid_for_route = grid.clone();
        let router = with_network(
            Router::new()
                .route(
                    "/stage/0xs0/enabled",
                    get(|| async { Json(EnabledResponse { enabled: true }) }),
                )
                .route(
                    "/stage/0xs0/cells",
                    get(move || {
                        let cells = grid_for_route.clone();
                        async move { Json(CellsResponse { cells }) }
                    }),
                )
                .route(
                    "/stage/0xs0/value",
                    get(|| async { Json(ValueResponse { total: 400 }) }),
                ),
        );
        let (base, handle) = serve_router(router).await;
        let provider = provider_for(&base).await;

        assert!(provider.get_enabled("0xs0").await.unwrap());
        assert_eq!(provider.get_all_cells("0xs0").await.unwrap(), grid);
        assert_eq!(provider.get_aggregate_value("0xs0").await.unwrap(), 400);

        handle.abort();
    }

    #[tokio::test]
    async fn unknown_stage_maps_not_found() {
        let router = with_network(Router::new());
        let (base, handle) = serve_router(router).await;
        let provider = provider_for(&base).await;

        let err = provider.get_enabled("0xmissing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownStage(stage) if stage == "0xmissing"));

        handle.abort();
    }

    #[tokio::test]
    async fn server_error_carries_body() {
        let router = with_network(Router::new().route(
            "/stage/0xs0/value",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "ledger exploded") }),
        ));
        let (base, handle) = serve_router(router).await;
        let provider = provider_for(&base).await;

        let err = provider.get_aggregate_value("0xs0").await.unwrap_err();
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "ledger exploded");

        handle.abort();
    }
}
