//! Connection pool under bursty load.
//!
//! This example drives a pool backed by an in-memory mock service with
//! waves of concurrent jobs, logging the open and idle connection counts
//! once per second so growth and idle eviction are visible.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=info,connpool=debug cargo run --example connection_pool
//! ```
//!
//! Press ctrl-c to stop early; the pool is closed either way.

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use connpool::{BoxError, Connection, Pool, PoolConfig};
use connpool_testing::{MockBackend, MockConnection};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const WAVES: usize = 5;
const JOBS_PER_WAVE: usize = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== Connection Pool Example ===\n");

    let config = PoolConfig::new()
        .min_connections(5)
        .max_connections(20)
        .idle_timeout(Duration::from_secs(3))
        .connection_timeout(Duration::from_secs(10));

    println!("Pool configuration:");
    println!("  Min connections: {}", config.min_connections);
    println!("  Max connections: {}", config.max_connections);
    println!("  Idle timeout: {:?}", config.idle_timeout);
    println!();

    let backend = MockBackend::builder()
        .with_connect_delay(Duration::from_millis(20))
        .with_execute_delay(Duration::from_millis(250))
        .build();
    let pool = Pool::new(config, backend.factory()).await?;

    let monitor = tokio::spawn(monitor(pool.clone()));

    tokio::select! {
        () = run_waves(&pool) => println!("\nAll waves finished."),
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("\nInterrupted.");
        }
    }

    monitor.abort();

    let status = pool.status();
    println!("\nFinal status:");
    println!("  Open: {} ({} idle, {} in use)", status.total, status.available, status.in_use);
    println!("  Connections created: {}", backend.created());
    println!("  Connections closed: {}", backend.closed());
    println!("  Jobs executed: {}", backend.executed());

    println!("\nClosing pool...");
    pool.close().await?;
    println!("Pool closed, {} connections still live.", backend.live());

    Ok(())
}

/// Fire waves of concurrent jobs, pausing long enough between waves for
/// grown connections to pass their idle timeout.
async fn run_waves(pool: &Pool<MockConnection>) {
    for wave in 0..WAVES {
        let start = Instant::now();
        let mut jobs = JoinSet::new();

        for job in 0..JOBS_PER_WAVE {
            let pool = pool.clone();
            // Stagger arrivals so some jobs find idle connections.
            let delay = Duration::from_millis(((job % 8) as u64 + 1) * 50);
            jobs.spawn(async move {
                tokio::time::sleep(delay).await;
                pool.handle(|conn| {
                    Box::pin(async move {
                        conn.execute(format!("wave {wave} job {job}"))
                            .await
                            .map_err(BoxError::from)
                    })
                })
                .await
            });
        }

        let mut failed = 0;
        while let Some(result) = jobs.join_next().await {
            if !matches!(result, Ok(Ok(()))) {
                failed += 1;
            }
        }

        println!(
            "Wave {}: {} jobs in {:?} ({} failed)",
            wave + 1,
            JOBS_PER_WAVE,
            start.elapsed(),
            failed
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

async fn monitor(pool: Pool<MockConnection>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let (open, idle) = pool.active();
        tracing::info!(open, idle, "pool activity");
    }
}
