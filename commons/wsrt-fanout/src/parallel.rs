use crate::operation::{Accepted, OperationError, TargetOperation};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a parallel fan-out. Indices refer to the input order.
#[derive(Debug)]
pub struct ParallelReport<O> {
    pub accepted: Vec<Accepted<O>>,
    pub rejected: Vec<usize>,
    pub failed: Vec<(usize, OperationError)>,
    /// Still running at the deadline; their tokens were cancelled.
    pub incomplete: Vec<usize>,
    pub skipped: Vec<usize>,
}

impl<O> Default for ParallelReport<O> {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
            failed: Vec::new(),
            incomplete: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<O> ParallelReport<O> {
    /// True when every started target produced an acceptable result.
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
            && self.failed.is_empty()
            && self.incomplete.is_empty()
    }
}

/// Starts the operation on every eligible target concurrently and waits at
/// most `deadline` for all of them.
///
/// Each completion is recorded as it arrives, so a failing or panicking
/// target never affects the others. Targets still running when the deadline
/// fires get their token cancelled and are reported as incomplete; their
/// tasks are detached so they can observe the cancellation and wind down.
pub async fn do_in_parallel<T, O>(
    targets: impl IntoIterator<Item = T>,
    op: Arc<O>,
    deadline: Duration,
) -> ParallelReport<O::Output>
where
    T: Send + Sync + 'static,
    O: TargetOperation<T> + 'static,
{
    let mut report = ParallelReport::default();
    let mut set = JoinSet::new();
    let mut tokens: BTreeMap<usize, CancellationToken> = BTreeMap::new();
    let mut tasks = HashMap::new();

    for (index, target) in targets.into_iter().enumerate() {
        if !op.can_attempt(&target) {
            report.skipped.push(index);
            continue;
        }
        let token = CancellationToken::new();
        tokens.insert(index, token.clone());
        let op = op.clone();
        let handle = set.spawn(async move {
            let result = op.start(&target, token).await;
            let acceptable = match &result {
                Ok(output) => op.is_acceptable(&target, output),
                Err(_) => false,
            };
            (index, result, acceptable)
        });
        tasks.insert(handle.id(), index);
    }
    debug!(started = tokens.len(), ?deadline, "fan-out started");

    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            joined = set.join_next_with_id() => match joined {
                None => break,
                Some(Ok((id, (index, result, acceptable)))) => {
                    tasks.remove(&id);
                    tokens.remove(&index);
                    match result {
                        Ok(output) if acceptable => {
                            report.accepted.push(Accepted { index, output });
                        }
                        Ok(_) => report.rejected.push(index),
                        Err(e) => {
                            warn!(index, error = %e, "target failed");
                            report.failed.push((index, e));
                        }
                    }
                }
                Some(Err(e)) => {
                    let Some(index) = tasks.remove(&e.id()) else {
                        continue;
                    };
                    tokens.remove(&index);
                    warn!(index, error = %e, "target task aborted");
                    report
                        .failed
                        .push((index, OperationError::Panicked(e.to_string())));
                }
            },
            _ = &mut sleep => {
                for (index, token) in std::mem::take(&mut tokens) {
                    token.cancel();
                    report.incomplete.push(index);
                }
                warn!(
                    incomplete = report.incomplete.len(),
                    ?deadline,
                    "fan-out deadline reached"
                );
                set.detach_all();
                break;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Target value is the delay in milliseconds; `u64::MAX` never finishes
    /// on its own, 13 panics, 7 fails and odd values are rejected.
    #[derive(Default)]
    struct Delayed {
        cancelled: AtomicUsize,
    }

    #[async_trait]
    impl TargetOperation<u64> for Delayed {
        type Output = u64;

        fn can_attempt(&self, target: &u64) -> bool {
            *target != 1
        }

        async fn start(
            &self,
            target: &u64,
            cancel: CancellationToken,
        ) -> Result<u64, OperationError> {
            match *target {
                u64::MAX => {
                    cancel.cancelled().await;
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(OperationError::Cancelled)
                }
                13 => panic!("unlucky target"),
                7 => Err(OperationError::failed("refused")),
                ms => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(ms)
                }
            }
        }

        fn is_acceptable(&self, _target: &u64, output: &u64) -> bool {
            output % 2 == 0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_completion_is_recorded_independently() {
        let op = Arc::new(Delayed::default());
        let report =
            do_in_parallel(vec![20, 1, 7, 13, 30, 5], op, Duration::from_secs(1))
                .await;

        let mut accepted: Vec<_> =
            report.accepted.iter().map(|a| (a.index, a.output)).collect();
        accepted.sort();
        assert_eq!(accepted, vec![(0, 20), (4, 30)]);
        assert_eq!(report.rejected, vec![5]);
        assert_eq!(report.skipped, vec![1]);
        let mut failed: Vec<_> = report.failed.iter().map(|f| f.0).collect();
        failed.sort();
        assert_eq!(failed, vec![2, 3]);
        assert!(report.incomplete.is_empty());
        assert!(!report.all_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_outstanding_targets() {
        let op = Arc::new(Delayed::default());
        let started = Instant::now();
        let report = do_in_parallel(
            vec![10, u64::MAX, u64::MAX],
            op.clone(),
            Duration::from_millis(500),
        )
        .await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.incomplete, vec![1, 2]);

        // Detached tasks observe the cancellation after the report returns.
        for _ in 0..10 {
            if op.cancelled.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(op.cancelled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_input_returns_immediately() {
        let op = Arc::new(Delayed::default());
        let report =
            do_in_parallel(Vec::<u64>::new(), op, Duration::from_secs(60)).await;
        assert!(report.all_accepted());
        assert!(report.accepted.is_empty());
    }
}
