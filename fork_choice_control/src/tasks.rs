use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use tokio::task::JoinHandle;
use types::phase0::primitives::{DepositIndex, H256};

/// Bookkeeping for deposits that can no longer be reorganized away.
///
/// Called after the finalized checkpoint advances. Implementations may block.
pub trait DepositFinalizer: Send + Sync + 'static {
    fn finalize_deposits(
        &self,
        eth1_deposit_index: DepositIndex,
        finalized_root: H256,
    ) -> Result<()>;
}

pub struct NullDepositFinalizer;

impl DepositFinalizer for NullDepositFinalizer {
    fn finalize_deposits(
        &self,
        _eth1_deposit_index: DepositIndex,
        _finalized_root: H256,
    ) -> Result<()> {
        Ok(())
    }
}

/// Runs [`DepositFinalizer::finalize_deposits`] in the background.
///
/// The task is abandoned if it does not finish within `deadline`. Its outcome is only logged.
pub fn spawn_deposit_finalization(
    finalizer: Arc<dyn DepositFinalizer>,
    eth1_deposit_index: DepositIndex,
    finalized_root: H256,
    deadline: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let task = tokio::task::spawn_blocking(move || {
            finalizer.finalize_deposits(eth1_deposit_index, finalized_root)
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(()))) => debug!(
                "finalized deposits \
                 (eth1_deposit_index: {eth1_deposit_index}, finalized_root: {finalized_root:?})",
            ),
            Ok(Ok(Err(error))) => warn!("deposit finalization failed: {error:?}"),
            Ok(Err(error)) => warn!("deposit finalization task panicked: {error}"),
            Err(_) => warn!(
                "deposit finalization did not finish in {} ms (finalized_root: {finalized_root:?})",
                deadline.as_millis(),
            ),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::thread;

    use parking_lot::Mutex;
    use std_ext::ArcExt as _;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(DepositIndex, H256)>>,
        delay: Duration,
    }

    impl DepositFinalizer for Recorder {
        fn finalize_deposits(
            &self,
            eth1_deposit_index: DepositIndex,
            finalized_root: H256,
        ) -> Result<()> {
            thread::sleep(self.delay);
            self.calls.lock().push((eth1_deposit_index, finalized_root));
            Ok(())
        }
    }

    #[tokio::test]
    async fn finalizer_is_called_with_finalized_root() -> Result<()> {
        let recorder = Arc::new(Recorder::default());
        let root = H256::repeat_byte(4);

        spawn_deposit_finalization(recorder.clone_arc(), 12, root, Duration::from_secs(1)).await?;

        assert_eq!(*recorder.calls.lock(), [(12, root)]);

        Ok(())
    }

    #[tokio::test]
    async fn slow_finalizer_does_not_outlive_deadline() -> Result<()> {
        let recorder = Arc::new(Recorder {
            delay: Duration::from_millis(200),
            ..Recorder::default()
        });

        spawn_deposit_finalization(recorder.clone_arc(), 0, H256::zero(), Duration::from_millis(10))
            .await?;

        assert!(recorder.calls.lock().is_empty());

        Ok(())
    }
}
