use crate::error::{OrderError, OrderResult};
use std::future::Future;
use std::time::Duration;

/// Run an operation under a deadline.
///
/// On expiry the operation future is dropped, which drops any open unit of
/// work and with it every uncommitted write.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> OrderResult<T>
where
    F: Future<Output = OrderResult<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(OrderError::DeadlineExceeded(deadline)),
    }
}
