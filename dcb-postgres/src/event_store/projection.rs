//! The projection engine.
//!
//! A projection folds a set of projectors over the events matching the
//! union of their queries, in one scan, in `(transaction_id, position)`
//! order. Each scanned event is routed through every projector whose own
//! query matches it, so overlapping projectors both observe an event while
//! a projector out of scope never does. The resulting append condition
//! covers exactly what the projection observed: the union query, bounded at
//! the last cursor seen.
//!
//! The synchronous variant materializes final states. The streaming variant
//! runs the scan on a spawned task and emits one update per applied event
//! on a bounded channel; a process-wide counter caps how many of those
//! tasks may be in flight.
use crate::error::Error;
use crate::event_store::PgEventStore;
use dcb::{
    union_query, AppendCondition, Cursor, EventStore, Projection, Query, StateProjector,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

impl PgEventStore {
    /// Folds `projectors` over the matching events after `after` and
    /// returns the final state per projector id together with the append
    /// condition aligned to the projection's scope.
    ///
    /// Bounded by the configured query timeout.
    pub async fn project<P>(
        &self,
        projectors: &[P],
        after: Option<Cursor>,
    ) -> Result<Projection<P::State>, Error>
    where
        P: StateProjector,
    {
        let union = union_query(projectors)?;
        let scan = async {
            let mut states: Vec<P::State> =
                projectors.iter().map(|p| p.initial_state()).collect();
            let mut last = None;
            if !union.is_none() {
                let mut events = self.stream(&union, after);
                while let Some(event) = events.next().await {
                    let event = event?;
                    last = Some(event.cursor());
                    for (projector, state) in projectors.iter().zip(states.iter_mut()) {
                        if projector.query().matches(&event) {
                            *state = projector.apply(state.clone(), &event);
                        }
                    }
                }
            }
            let last_cursor = last.or(after);
            Ok(Projection {
                states: projectors
                    .iter()
                    .map(|p| p.id().to_string())
                    .zip(states)
                    .collect::<HashMap<_, _>>(),
                append_condition: AppendCondition {
                    fail_if_events_match: union.clone(),
                    after_cursor: last_cursor,
                },
                last_cursor,
            })
        };
        timeout(self.config.query_timeout, scan)
            .await
            .map_err(|_| Error::Canceled)?
    }

    /// Starts a streaming projection on a spawned task.
    ///
    /// Fails immediately with [`Error::TooManyProjections`] when the
    /// configured cap of in-flight streaming projections is reached; there
    /// is no queueing. Otherwise returns a [`ProjectionStream`] delivering
    /// one [`ProjectionUpdate`] per applied event and, once the scan is
    /// done, the append condition.
    pub fn project_stream<P>(
        &self,
        projectors: Vec<P>,
        after: Option<Cursor>,
    ) -> Result<ProjectionStream<P::State>, Error>
    where
        P: StateProjector + 'static,
        P::State: 'static,
    {
        let union = union_query(&projectors)?;
        let permit = ProjectionPermit::acquire(
            Arc::clone(&self.projections),
            self.config.max_concurrent_projections,
        )?;
        let (updates_tx, updates_rx) = mpsc::channel(self.config.stream_buffer);
        let (condition_tx, condition_rx) = oneshot::channel();
        let token = CancellationToken::new();

        let store = self.clone();
        let task_token = token.clone();
        let deadline = self.config.query_timeout;
        tokio::spawn(async move {
            let _permit = permit;
            let fold = run_stream(&store, &projectors, &union, after, &updates_tx);
            let result = tokio::select! {
                _ = task_token.cancelled() => Err(Error::Canceled),
                outcome = timeout(deadline, fold) => outcome.unwrap_or(Err(Error::Canceled)),
            };
            if let Err(err) = &result {
                tracing::debug!(%err, "streaming projection ended early");
            }
            let _ = condition_tx.send(result);
        });

        Ok(ProjectionStream {
            updates: updates_rx,
            condition: condition_rx,
            guard: CancelOnDrop(token),
        })
    }
}

async fn run_stream<P>(
    store: &PgEventStore,
    projectors: &[P],
    union: &Query,
    after: Option<Cursor>,
    updates: &mpsc::Sender<ProjectionUpdate<P::State>>,
) -> Result<AppendCondition, Error>
where
    P: StateProjector,
{
    let mut states: Vec<P::State> = projectors.iter().map(|p| p.initial_state()).collect();
    let mut last = None;
    if !union.is_none() {
        let mut events = store.stream(union, after);
        while let Some(event) = events.next().await {
            let event = event?;
            last = Some(event.cursor());
            for (projector, state) in projectors.iter().zip(states.iter_mut()) {
                if projector.query().matches(&event) {
                    *state = projector.apply(state.clone(), &event);
                    let update = ProjectionUpdate {
                        projector_id: projector.id().to_string(),
                        state: state.clone(),
                        cursor: event.cursor(),
                    };
                    // A dropped receiver is consumer cancellation.
                    if updates.send(update).await.is_err() {
                        return Err(Error::Canceled);
                    }
                }
            }
        }
    }
    Ok(AppendCondition {
        fail_if_events_match: union.clone(),
        after_cursor: last.or(after),
    })
}

/// One state change emitted by a streaming projection: the projector it
/// belongs to, its state after applying the event, and the event's cursor.
#[derive(Debug, Clone)]
pub struct ProjectionUpdate<S> {
    pub projector_id: String,
    pub state: S,
    pub cursor: Cursor,
}

/// Handle to a running streaming projection.
///
/// Updates arrive on a bounded channel: the producer suspends while the
/// consumer lags behind. Dropping the handle, or calling
/// [`cancel`](Self::cancel), aborts the scan, closes both channels, and
/// releases the projection slot.
#[derive(Debug)]
pub struct ProjectionStream<S> {
    updates: mpsc::Receiver<ProjectionUpdate<S>>,
    condition: oneshot::Receiver<Result<AppendCondition, Error>>,
    guard: CancelOnDrop,
}

impl<S> ProjectionStream<S> {
    /// The next state update, or `None` once the projection has finished or
    /// was canceled.
    pub async fn next_update(&mut self) -> Option<ProjectionUpdate<S>> {
        self.updates.recv().await
    }

    /// The append condition covering everything the projection observed.
    ///
    /// Delivered after the scan completes; drain the updates (until
    /// [`next_update`](Self::next_update) returns `None`) before awaiting
    /// this, otherwise a projection larger than the channel buffer never
    /// finishes.
    pub async fn append_condition(self) -> Result<AppendCondition, Error> {
        self.condition.await.map_err(|_| Error::Canceled)?
    }

    /// Aborts the projection. The running scan stops at its next
    /// suspension point and the channels close.
    pub fn cancel(&self) {
        self.guard.0.cancel();
    }
}

#[derive(Debug)]
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// RAII slot of the process-wide streaming projection counter.
struct ProjectionPermit {
    counter: Arc<AtomicUsize>,
}

impl ProjectionPermit {
    fn acquire(counter: Arc<AtomicUsize>, max: usize) -> Result<Self, Error> {
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= max {
                return Err(Error::TooManyProjections { max, current });
            }
            match counter.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Self { counter }),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Drop for ProjectionPermit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
