//! Per-operation deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, warn};

use crate::error::{ErrorKind, StoreError};

/// Default deadline for every store operation
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `op` under `limit`, measured from now.
///
/// On expiry the future is dropped, which aborts the underlying query, and
/// `StoreError::Timeout` is returned. Failures are logged here: caller
/// mistakes and misses at `warn`, persistence failures at `error`.
pub(crate) async fn within_deadline<T, F>(
    operation: &'static str,
    limit: Duration,
    op: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let result = match timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation, limit }),
    };

    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Store => error!(operation, error = %e, "store operation failed"),
            _ => warn!(operation, error = %e, "store operation rejected"),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result: Result<(), StoreError> = within_deadline("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Timeout { operation: "slow", .. })));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_result() {
        let ok = within_deadline("fast", DEFAULT_OP_TIMEOUT, async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = within_deadline("fast", DEFAULT_OP_TIMEOUT, async {
            Err::<(), _>(StoreError::not_found("id 1"))
        })
        .await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }
}
