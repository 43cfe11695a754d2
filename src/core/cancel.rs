//! Cooperative cancellation shared by playback sessions and generation targets.
//!
//! A token is created per session or per target and flipped exactly once. Anything that
//! reports progress checks the token at its own suspension points.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

/// Drives `fut` until it completes or `token` fires.
///
/// Returns `None` when the token won. Cancellation is checked first, so a future that is
/// ready at the same moment as a fired token is discarded.
pub async fn until_cancelled<F>(token: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}
