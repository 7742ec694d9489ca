/*!
 * TraceRayer - Async Runtime Demo
 *
 * Runs two operations on a shared worker pool:
 * - one that completes with a value
 * - one whose work item fails
 *
 * and awaits both completion futures concurrently.
 */

use futures::future;
use std::time::Duration;
use tracing::{info, warn};

use tracerayer::{init_tracing, AsyncError, AsyncOperation, PoolConfig, ResultValue, WorkerPool};

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize structured tracing
    init_tracing();

    info!("TraceRayer async runtime starting...");

    let config = PoolConfig::from_env();
    info!(max_threads = config.max_threads, "Initializing shared worker pool...");
    let pool = WorkerPool::new(config);

    let answer = AsyncOperation::builder().with_pool(pool.clone()).spawn(|_| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(ResultValue::I32(42))
    })?;

    let failing = AsyncOperation::builder()
        .with_pool(pool.clone())
        .spawn(|_| Err(AsyncError::Generic))?;

    let (answered, failed) = future::join(answer.completion(), failing.completion()).await;

    match answered {
        Ok(value) => info!(value = ?value, "operation completed"),
        Err(e) => warn!(error = %e, "operation failed"),
    }

    match failed {
        Ok(value) => info!(value = ?value, "operation completed"),
        Err(e) => warn!(error = %e, code = e.code(), "operation failed"),
    }

    for operation in [&answer, &failing] {
        let snapshot = operation.snapshot()?;
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(snapshot = %json, "operation snapshot"),
            Err(e) => warn!(error = %e, "could not serialize snapshot"),
        }
        operation.close()?;
    }

    info!(stats = ?pool.stats(), "TraceRayer async runtime shutting down");
    Ok(())
}
