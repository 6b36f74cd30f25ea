//! Fan-out of report fetches.
//!
//! Every project gets two tasks, one per service. All tasks are spawned up
//! front into a [`JoinSet`]; a shared [`Semaphore`] keeps at most
//! `concurrency` of them inside a request at any moment. Each task sends
//! exactly one outcome on the channel for its report type.
//!
//! Channels are sized to the project count, so a send never waits on the
//! receiver and a task never holds a permit while blocked. Dropping the
//! returned [`Dispatch`] (or calling [`JoinSet::abort_all`]) cancels
//! whatever is still running.

use std::sync::Arc;

use futures::future::BoxFuture;
use health_harvest_models::{
    BuildOutcome, FetchFailure, ProjectSource, QualityOutcome, ReportOutcome, Service,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::progress::ProgressCallback;
use crate::{FetchError, ReportFetcher};

/// Handles to an in-progress fan-out.
pub struct Dispatch {
    /// One outcome per project from the quality service, in arrival order.
    pub quality: mpsc::Receiver<QualityOutcome>,
    /// One outcome per project from the build service, in arrival order.
    pub builds: mpsc::Receiver<BuildOutcome>,
    /// The fetch tasks. Abort these to cancel outstanding requests.
    pub tasks: JoinSet<()>,
    /// Number of projects dispatched.
    pub expected: usize,
}

/// Spawns one quality and one build fetch per project.
///
/// `concurrency` is the maximum number of requests in flight; values below
/// one are treated as one.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn dispatch(
    fetcher: &Arc<dyn ReportFetcher>,
    sources: &[ProjectSource],
    concurrency: usize,
    progress: &Arc<dyn ProgressCallback>,
) -> Dispatch {
    let capacity = sources.len().max(1);
    let (quality_tx, quality_rx) = mpsc::channel(capacity);
    let (build_tx, build_rx) = mpsc::channel(capacity);
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    progress.set_total(sources.len() as u64 * 2);

    log::info!(
        "Dispatching {} fetches for {} project(s) (concurrency={})",
        sources.len() * 2,
        sources.len(),
        concurrency.max(1)
    );

    for source in sources {
        let source = Arc::new(source.clone());

        let quality_fetcher = Arc::clone(fetcher);
        spawn_fetch(
            &mut tasks,
            Service::Quality,
            Arc::clone(&source),
            Arc::clone(&permits),
            quality_tx.clone(),
            Arc::clone(progress),
            move |s| Box::pin(async move { quality_fetcher.fetch_quality(&s).await }),
        );

        let build_fetcher = Arc::clone(fetcher);
        spawn_fetch(
            &mut tasks,
            Service::Build,
            source,
            Arc::clone(&permits),
            build_tx.clone(),
            Arc::clone(progress),
            move |s| Box::pin(async move { build_fetcher.fetch_build(&s).await }),
        );
    }

    Dispatch {
        quality: quality_rx,
        builds: build_rx,
        tasks,
        expected: sources.len(),
    }
}

fn spawn_fetch<T, F>(
    tasks: &mut JoinSet<()>,
    service: Service,
    source: Arc<ProjectSource>,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<ReportOutcome<T>>,
    progress: Arc<dyn ProgressCallback>,
    fetch: F,
) where
    T: Send + 'static,
    F: FnOnce(Arc<ProjectSource>) -> BoxFuture<'static, Result<T, FetchError>> + Send + 'static,
{
    tasks.spawn(async move {
        let result = {
            // The semaphore is never closed, so acquire only fails if that
            // invariant is broken; report it like any other failed fetch.
            match permits.acquire().await {
                Ok(_permit) => fetch(Arc::clone(&source)).await,
                Err(e) => {
                    progress.inc(1);
                    let failure = FetchFailure::new(service, e.to_string());
                    tx.send(ReportOutcome::failure(&source.key, failure))
                        .await
                        .ok();
                    return;
                }
            }
        };

        let outcome = match result {
            Ok(report) => {
                log::debug!("[{}] {service} report collected", source.key);
                ReportOutcome::success(&source.key, report)
            }
            Err(e) => {
                log::warn!("[{}] {service} fetch failed: {e}", source.key);
                ReportOutcome::failure(&source.key, FetchFailure::new(service, e.to_string()))
            }
        };

        progress.inc(1);
        // The receiver is gone only when the run was abandoned.
        tx.send(outcome).await.ok();
    });
}
