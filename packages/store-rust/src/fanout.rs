//! Concurrent fan-out across mounts.
//!
//! Open, close, batch dispatch and iterator shutdown all touch several
//! independent stores. They run concurrently on the calling task and every
//! one of them is awaited, even after another has failed.

use std::fmt::Debug;
use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::warn;

/// Runs every task to completion and returns the failures in the order
/// they were observed.
pub(crate) async fn settle_all<L, F, I>(tasks: I) -> Vec<(L, anyhow::Error)>
where
    I: IntoIterator<Item = (L, F)>,
    F: Future<Output = anyhow::Result<()>>,
{
    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(label, task)| async move { (label, task.await) })
        .collect();

    let mut failures = Vec::new();
    while let Some((label, result)) = pending.next().await {
        if let Err(error) = result {
            failures.push((label, error));
        }
    }
    failures
}

/// Keeps the first observed failure and logs the rest.
pub(crate) fn first_failure<L: Debug>(
    store: &str,
    action: &'static str,
    failures: Vec<(L, anyhow::Error)>,
) -> Option<anyhow::Error> {
    let mut failures = failures.into_iter();
    let (_, first) = failures.next()?;
    for (label, error) in failures {
        warn!(store, action, mount = ?label, error = %error, "suppressed secondary failure");
    }
    Some(first)
}
