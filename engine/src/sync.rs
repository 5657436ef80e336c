//! Replica synchronization: one-time bootstrap per epoch, then live apply.
//!
//! A bootstrap run builds its snapshot off to the side and the run loop
//! installs it wholesale, so a failed or superseded run never partially
//! applies. Runs are tagged with a monotonically increasing epoch; a result
//! arriving after a newer run has started is discarded.
//!
//! Live notifications are applied strictly in arrival order per stage, with
//! no deduplication: the transport is assumed to deliver each committed
//! write exactly once, in commit order, per stage.
//! TODO: validate that assumption against the production push transport
//! with a reconnect/replay probe before relying on it for reconciliation.

use crate::metrics::Metrics;
use crate::replica::Replica;
use crate::source::{NotificationSource, ReadResolver, ReadSource};
use futures::stream::{FuturesUnordered, SelectAll};
use futures::{Future, Stream, StreamExt};
use lattice_types::api::Notification;
use lattice_types::{Address, Color, Snapshot, Stage};
use rand::Rng;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 16;
const RESUBSCRIBE_DELAY_MIN: Duration = Duration::from_secs(1);
const RESUBSCRIBE_DELAY_MAX: Duration = Duration::from_secs(3);

/// Delay before re-dialing a stage's notification stream, spread uniformly
/// over a window so streams that die together (one push endpoint behind
/// them all) do not re-dial in one burst.
fn resubscribe_delay(rng: &mut impl Rng) -> Duration {
    let min = RESUBSCRIBE_DELAY_MIN.as_millis() as u64;
    let max = RESUBSCRIBE_DELAY_MAX.as_millis() as u64;
    Duration::from_millis(rng.gen_range(min..=max))
}

/// External control of the running engine.
#[derive(Debug)]
pub enum Command {
    /// Re-run the full bootstrap (user-driven retry after a failure).
    Refresh,
    Shutdown,
}

/// Events for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Progress {
        epoch: u64,
        stage: usize,
        total: usize,
        percent: u8,
    },
    BootstrapComplete {
        snapshot: Snapshot,
    },
    /// Surfaced to the user as "try again later"; the replica keeps its
    /// previous state.
    BootstrapFailed {
        reason: String,
    },
    Live,
    /// Bootstrapped but without live updates.
    LiveDegraded {
        reason: String,
    },
    CellUpdated {
        stage: usize,
        row: usize,
        col: usize,
        buyer: Address,
        count: usize,
        color: Color,
        /// Refreshed aggregate, or `None` when the refresh failed and the
        /// stored total is stale until the next successful refresh.
        total_value: Option<u128>,
    },
}

enum StreamItem<E> {
    Event(Result<Notification, E>),
    Ended,
}

type TaggedStream<N> = Pin<
    Box<
        dyn Stream<Item = (usize, StreamItem<<N as NotificationSource>::Error>)>
            + Send,
    >,
>;

type BootstrapFuture<R> = Pin<
    Box<
        dyn Future<Output = (u64, Result<(<R as ReadResolver>::Source, Snapshot), String>)>
            + Send,
    >,
>;

type ResubscribeFuture<N> = Pin<
    Box<
        dyn Future<
                Output = (
                    usize,
                    Result<<N as NotificationSource>::Stream, <N as NotificationSource>::Error>,
                ),
            > + Send,
    >,
>;

fn tag_stream<N: NotificationSource>(index: usize, stream: N::Stream) -> TaggedStream<N> {
    Box::pin(
        stream
            .map(move |item| (index, StreamItem::Event(item)))
            .chain(futures::stream::once(async move {
                (index, StreamItem::Ended)
            })),
    )
}

/// Fills the replica with a bootstrap pass over all stages, then keeps it
/// current by applying the per-stage notification streams.
pub struct SyncEngine<R: ReadResolver, N: NotificationSource> {
    resolver: R,
    notifier: N,
    stage_ids: Arc<Vec<String>>,
    replica: Replica,
    metrics: Arc<Metrics>,
    events: mpsc::Sender<EngineEvent>,
    commands: Option<mpsc::Receiver<Command>>,
    provider: Option<R::Source>,
}

impl<R: ReadResolver, N: NotificationSource> SyncEngine<R, N> {
    pub fn new(
        resolver: R,
        notifier: N,
        stage_ids: Vec<String>,
        replica: Replica,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::Sender<Command>, mpsc::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        (
            Self {
                resolver,
                notifier,
                stage_ids: Arc::new(stage_ids),
                replica,
                metrics,
                events: event_tx,
                commands: Some(command_rx),
                provider: None,
            },
            command_tx,
            event_rx,
        )
    }

    pub async fn run(mut self) {
        let Some(mut commands) = self.commands.take() else {
            return;
        };
        let mut epoch: u64 = 0;
        let mut bootstraps: FuturesUnordered<BootstrapFuture<R>> = FuturesUnordered::new();
        let mut streams: SelectAll<TaggedStream<N>> = SelectAll::new();
        let mut resubscribes: FuturesUnordered<ResubscribeFuture<N>> = FuturesUnordered::new();

        bootstraps.push(self.spawn_bootstrap(epoch));

        loop {
            tokio::select! {
                Some((run_epoch, result)) = bootstraps.next(), if !bootstraps.is_empty() => {
                    if run_epoch != epoch {
                        debug!(run_epoch, epoch, "discarding stale bootstrap result");
                        self.metrics.stale_epochs_discarded.inc();
                        continue;
                    }
                    match result {
                        Ok((provider, snapshot)) => {
                            self.replica.install(snapshot.clone()).await;
                            self.provider = Some(provider);
                            let _ = self
                                .events
                                .send(EngineEvent::BootstrapComplete { snapshot })
                                .await;
                            streams = SelectAll::new();
                            let mut degraded = None;
                            for (index, stage_id) in self.stage_ids.iter().enumerate() {
                                match self.notifier.subscribe(stage_id).await {
                                    Ok(stream) => streams.push(tag_stream::<N>(index, stream)),
                                    Err(err) => {
                                        warn!(stage = index, error = %err, "notification subscribe failed, will retry");
                                        self.metrics.subscribe_failures.inc();
                                        degraded.get_or_insert_with(|| err.to_string());
                                        resubscribes.push(self.spawn_resubscribe(index));
                                    }
                                }
                            }
                            match degraded {
                                Some(reason) => {
                                    let _ = self
                                        .events
                                        .send(EngineEvent::LiveDegraded { reason })
                                        .await;
                                }
                                None => {
                                    self.metrics.live.set(1);
                                    let _ = self.events.send(EngineEvent::Live).await;
                                }
                            }
                            info!(epoch, stages = self.stage_ids.len(), "replica live");
                        }
                        Err(reason) => {
                            warn!(reason = reason.as_str(), "bootstrap failed, replica unchanged");
                            self.metrics.bootstrap_failures.inc();
                            let _ = self
                                .events
                                .send(EngineEvent::BootstrapFailed { reason })
                                .await;
                        }
                    }
                }
                Some((stage, item)) = streams.next(), if !streams.is_empty() => {
                    match item {
                        StreamItem::Event(Ok(Notification::LayersPurchased {
                            buyer,
                            row,
                            col,
                            count,
                            color,
                        })) => {
                            self.apply_purchase(stage, buyer, row, col, count, color).await;
                        }
                        StreamItem::Event(Ok(Notification::StageEnabled)) => {
                            if stage == 0 {
                                warn!("stage 0 is always enabled, dropping enable notification");
                                continue;
                            }
                            // Newly-enabled dimensions were unknown, so the
                            // whole replica is rebuilt rather than patched.
                            info!(stage, "stage enabled, rebuilding replica");
                            epoch += 1;
                            streams = SelectAll::new();
                            resubscribes.clear();
                            self.metrics.live.set(0);
                            bootstraps.push(self.spawn_bootstrap(epoch));
                        }
                        StreamItem::Event(Err(err)) => {
                            warn!(stage, error = %err, "notification stream error");
                        }
                        StreamItem::Ended => {
                            debug!(stage, "notification stream ended, resubscribing");
                            self.metrics.resubscribes.inc();
                            resubscribes.push(self.spawn_resubscribe(stage));
                        }
                    }
                }
                Some((stage, result)) = resubscribes.next(), if !resubscribes.is_empty() => {
                    match result {
                        Ok(stream) => {
                            debug!(stage, "resubscribed to notification stream");
                            streams.push(tag_stream::<N>(stage, stream));
                        }
                        Err(err) => {
                            warn!(stage, error = %err, "resubscribe failed, retrying");
                            self.metrics.subscribe_failures.inc();
                            resubscribes.push(self.spawn_resubscribe(stage));
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Refresh) => {
                            info!("refresh requested, rebuilding replica");
                            epoch += 1;
                            streams = SelectAll::new();
                            resubscribes.clear();
                            self.metrics.live.set(0);
                            bootstraps.push(self.spawn_bootstrap(epoch));
                        }
                        Some(Command::Shutdown) | None => {
                            info!("sync engine shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn spawn_bootstrap(&self, epoch: u64) -> BootstrapFuture<R> {
        self.metrics.bootstraps.inc();
        let resolver = self.resolver.clone();
        let stage_ids = self.stage_ids.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(run_bootstrap(resolver, stage_ids, epoch, events));
        Box::pin(async move {
            match handle.await {
                Ok(result) => (epoch, result.map_err(|err| err.to_string())),
                Err(err) => (epoch, Err(format!("bootstrap task failed: {err}"))),
            }
        })
    }

    fn spawn_resubscribe(&self, stage: usize) -> ResubscribeFuture<N> {
        let notifier = self.notifier.clone();
        let stage_id = self.stage_ids[stage].clone();
        let delay = resubscribe_delay(&mut rand::thread_rng());
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            (stage, notifier.subscribe(&stage_id).await)
        })
    }

    async fn apply_purchase(
        &self,
        stage: usize,
        buyer: Address,
        row: usize,
        col: usize,
        count: usize,
        color: Color,
    ) {
        // The aggregate comes from the remote accessor, not a local sum:
        // per-layer pricing must match the ledger's own accounting exactly.
        let mut refreshed = None;
        if let Some(provider) = &self.provider {
            match provider.get_aggregate_value(&self.stage_ids[stage]).await {
                Ok(value) => {
                    if self.replica.set_total_value(stage, value).await.is_ok() {
                        refreshed = Some(value);
                    }
                }
                Err(err) => {
                    warn!(stage, error = %err, "aggregate refresh failed, total left stale");
                    self.metrics.value_refresh_failures.inc();
                }
            }
        }
        match self
            .replica
            .append_layers(stage, row, col, count, buyer.clone(), color)
            .await
        {
            Ok(()) => {
                self.metrics.notifications_applied.inc();
                let _ = self
                    .events
                    .send(EngineEvent::CellUpdated {
                        stage,
                        row,
                        col,
                        buyer,
                        count,
                        color,
                        total_value: refreshed,
                    })
                    .await;
            }
            Err(err) => {
                warn!(%err, "dropping notification for unknown coordinate");
                self.metrics.notifications_out_of_range.inc();
            }
        }
    }
}

/// One bootstrap pass over all stages, in strict index order (later stages'
/// interpretation depends on earlier stages' economics).
///
/// Once a disabled stage is seen, enablement and cell fetches stop — the
/// remaining stages are not meaningful yet — but the aggregate-value fetch
/// continues for every stage, because locked stages still display progress
/// toward their unlock requirement.
async fn run_bootstrap<R: ReadResolver>(
    resolver: R,
    stage_ids: Arc<Vec<String>>,
    epoch: u64,
    events: mpsc::Sender<EngineEvent>,
) -> Result<(R::Source, Snapshot), R::Error> {
    let provider = resolver.resolve().await?;
    let total = stage_ids.len();
    let mut stages = Vec::with_capacity(total);
    let mut total_values = Vec::with_capacity(total);
    let mut frontier_passed = false;
    for (index, stage_id) in stage_ids.iter().enumerate() {
        if frontier_passed {
            stages.push(Stage::disabled());
        } else if provider.get_enabled(stage_id).await? {
            let cells = provider.get_all_cells(stage_id).await?;
            stages.push(Stage::enabled(cells));
        } else {
            frontier_passed = true;
            stages.push(Stage::disabled());
        }
        total_values.push(provider.get_aggregate_value(stage_id).await?);

        let percent = (((index + 1) * 100) / total) as u8;
        let _ = events
            .send(EngineEvent::Progress {
                epoch,
                stage: index,
                total,
                percent,
            })
            .await;
    }
    Ok((
        provider,
        Snapshot {
            stages,
            total_values,
        },
    ))
}
