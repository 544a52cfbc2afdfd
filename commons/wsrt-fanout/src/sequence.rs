use crate::operation::{Accepted, TargetOperation};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attempts targets in collection order and returns the first acceptable
/// result.
///
/// Ineligible targets are skipped. Each attempt may use whatever is left
/// of `budget`; an attempt that overruns it has its token cancelled and is
/// treated like a failure. Returns `None` when no target produced an
/// acceptable result.
pub async fn do_in_sequence<T, O>(
    targets: &[T],
    op: &O,
    budget: Duration,
) -> Option<Accepted<O::Output>>
where
    T: Send + Sync,
    O: TargetOperation<T>,
{
    let deadline = Instant::now() + budget;
    for (index, target) in targets.iter().enumerate() {
        if !op.can_attempt(target) {
            debug!(index, "target not eligible, skipping");
            continue;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(index, ?budget, "sequence budget exhausted");
            break;
        }

        let token = CancellationToken::new();
        match tokio::time::timeout(remaining, op.start(target, token.clone()))
            .await
        {
            Ok(Ok(output)) => {
                if op.is_acceptable(target, &output) {
                    debug!(index, "accepted result");
                    return Some(Accepted { index, output });
                }
                debug!(index, "result not acceptable");
            }
            Ok(Err(e)) => {
                warn!(index, error = %e, "operation failed on target");
            }
            Err(_) => {
                token.cancel();
                warn!(index, ?remaining, "operation timed out on target");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Targets are `(eligible, value)`; values above 10 are acceptable and
    /// value 0 fails.
    struct ScriptedOp {
        started: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl TargetOperation<(bool, u32)> for ScriptedOp {
        type Output = u32;

        fn can_attempt(&self, target: &(bool, u32)) -> bool {
            target.0
        }

        async fn start(
            &self,
            target: &(bool, u32),
            _cancel: CancellationToken,
        ) -> Result<u32, OperationError> {
            self.started.lock().unwrap().push(target.1);
            if target.1 == 0 {
                return Err(OperationError::failed("boom"));
            }
            Ok(target.1)
        }

        fn is_acceptable(&self, _target: &(bool, u32), output: &u32) -> bool {
            *output > 10
        }
    }

    #[tokio::test]
    async fn stops_at_first_acceptable() {
        let op = ScriptedOp {
            started: Mutex::new(Vec::new()),
        };
        let targets =
            [(true, 0), (false, 99), (true, 5), (true, 42), (true, 77)];
        let got = do_in_sequence(&targets, &op, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got, Accepted { index: 3, output: 42 });
        assert_eq!(*op.started.lock().unwrap(), vec![0, 5, 42]);
    }

    #[tokio::test]
    async fn none_when_nothing_acceptable() {
        let op = ScriptedOp {
            started: Mutex::new(Vec::new()),
        };
        let targets = [(true, 1), (false, 50), (true, 0)];
        assert!(
            do_in_sequence(&targets, &op, Duration::from_secs(1))
                .await
                .is_none()
        );
    }

    struct Hang;

    #[async_trait]
    impl TargetOperation<u64> for Hang {
        type Output = u64;

        async fn start(
            &self,
            target: &u64,
            cancel: CancellationToken,
        ) -> Result<u64, OperationError> {
            if *target == 0 {
                cancel.cancelled().await;
                return Err(OperationError::Cancelled);
            }
            Ok(*target)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_target_consumes_budget() {
        let op = Hang;
        let started = Instant::now();
        let got = do_in_sequence(&[0, 7], &op, Duration::from_secs(5)).await;
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
