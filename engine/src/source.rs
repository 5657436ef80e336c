//! Seams between the engine and its transports, so the sync and purchase
//! machinery runs unchanged against the real clients or scripted mocks.

use futures::Stream;
use lattice_client::{Notifier, NotificationStream, Provider, Resolver, Submitter};
use lattice_types::api::{Notification, Receipt, WriteRequest};
use lattice_types::Grid;
use std::future::Future;

/// A probed read endpoint: stage enablement, cell grids, aggregate values.
pub trait ReadSource: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_enabled(
        &self,
        stage_id: &str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn get_all_cells(
        &self,
        stage_id: &str,
    ) -> impl Future<Output = Result<Grid, Self::Error>> + Send;

    fn get_aggregate_value(
        &self,
        stage_id: &str,
    ) -> impl Future<Output = Result<u128, Self::Error>> + Send;
}

/// Selects a working read endpoint; each bootstrap run resolves afresh.
pub trait ReadResolver: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Source: ReadSource<Error = Self::Error>;

    fn resolve(&self) -> impl Future<Output = Result<Self::Source, Self::Error>> + Send;
}

/// Per-stage push feed of committed changes.
pub trait NotificationSource: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Stream: Stream<Item = Result<Notification, Self::Error>> + Send + Unpin + 'static;

    fn subscribe(
        &self,
        stage_id: &str,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send;
}

/// Signing/submission transport for sized writes.
pub trait SubmitTransport: Send + Sync {
    fn estimate(
        &self,
        write: &WriteRequest,
    ) -> impl Future<Output = lattice_client::Result<u64>> + Send;

    fn submit(
        &self,
        write: &WriteRequest,
        value: u128,
        budget: u64,
    ) -> impl Future<Output = lattice_client::Result<Receipt>> + Send;

    fn confirm(&self, receipt: &Receipt) -> impl Future<Output = lattice_client::Result<()>> + Send;
}

impl ReadSource for Provider {
    type Error = lattice_client::Error;

    async fn get_enabled(&self, stage_id: &str) -> Result<bool, Self::Error> {
        Provider::get_enabled(self, stage_id).await
    }

    async fn get_all_cells(&self, stage_id: &str) -> Result<Grid, Self::Error> {
        Provider::get_all_cells(self, stage_id).await
    }

    async fn get_aggregate_value(&self, stage_id: &str) -> Result<u128, Self::Error> {
        Provider::get_aggregate_value(self, stage_id).await
    }
}

impl ReadResolver for Resolver {
    type Error = lattice_client::Error;
    type Source = Provider;

    async fn resolve(&self) -> Result<Provider, Self::Error> {
        Resolver::resolve(self).await
    }
}

impl NotificationSource for Notifier {
    type Error = lattice_client::Error;
    type Stream = NotificationStream;

    async fn subscribe(&self, stage_id: &str) -> Result<NotificationStream, Self::Error> {
        Notifier::subscribe(self, stage_id).await
    }
}

impl SubmitTransport for Submitter {
    async fn estimate(&self, write: &WriteRequest) -> lattice_client::Result<u64> {
        Submitter::estimate(self, write).await
    }

    async fn submit(
        &self,
        write: &WriteRequest,
        value: u128,
        budget: u64,
    ) -> lattice_client::Result<Receipt> {
        Submitter::submit(self, write, value, budget).await
    }

    async fn confirm(&self, receipt: &Receipt) -> lattice_client::Result<()> {
        Submitter::confirm(self, receipt).await
    }
}
