// SPDX-License-Identifier: Apache-2.0
//! Entry and exit events around public client operations.

use crate::error::Result;
use std::future::Future;
use tracing::{Instrument, Span, debug};

/// Run `operation` inside `span`, emitting a debug event when it starts and when it finishes.
pub(crate) async fn logged<T, F>(span: &Span, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    async move {
        debug!(operation, "enter");
        let result = fut.await;
        match &result {
            Ok(_) => debug!(operation, "exit"),
            Err(e) => debug!(operation, error = %e, "exit with error"),
        }
        result
    }
    .instrument(span.clone())
    .await
}
