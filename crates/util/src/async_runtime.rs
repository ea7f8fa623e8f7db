//! Bridge from synchronous call sites into async work.
//!
//! The lifecycle runner seam is synchronous (one blocking external call per
//! step) while child processes are driven through `tokio::process`. This
//! module runs such futures to completion from sync code.

use anyhow::anyhow;
use std::future::Future;
use tokio::{runtime::Handle, task};

/// Execute an async future from synchronous code.
///
/// Reuses the ambient Tokio runtime through `block_in_place`, which requires a
/// multi-threaded runtime. Outside any runtime a current-thread runtime is
/// built for the single call.
pub fn block_on_future<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        task::block_in_place(|| handle.block_on(future))
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| anyhow!(error))?
            .block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::block_on_future;

    #[test]
    fn runs_future_without_ambient_runtime() {
        let value = block_on_future(async { Ok(21 * 2) }).expect("future completes");
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reuses_multi_thread_runtime() {
        let value = block_on_future(async {
            tokio::task::yield_now().await;
            Ok("done")
        })
        .expect("future completes");
        assert_eq!(value, "done");
    }
}
