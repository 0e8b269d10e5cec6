use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{Error, Result, stage::SearchStage};

/// Runs one external call under the stage timeout and the request's cancellation token.
pub async fn guarded<T, F>(
	stage: SearchStage,
	timeout_ms: u64,
	cancel: &CancellationToken,
	fut: F,
) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled { stage }),
		res = tokio::time::timeout(Duration::from_millis(timeout_ms), fut) => match res {
			Ok(inner) => inner,
			Err(_) => Err(Error::Timeout { stage, timeout_ms }),
		},
	}
}
