//! Mock backend fidelity tests.
//!
//! These tests check that the mock backend behaves like a real backend does
//! from the pool's point of view: every connection the pool opens is closed
//! exactly once, and fault switches take effect on the next call.
//!
//! ```bash
//! cargo test -p connpool-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use connpool::{BoxError, Connection, PoolError};
use connpool_testing::{MockBackend, MockError, PoolFixture, init_tracing};

#[tokio::test]
async fn test_fixture_fills_pool_from_backend() {
    init_tracing();
    let fixture = PoolFixture::new(PoolFixture::small_config(), MockBackend::default())
        .await
        .expect("fixture should build");

    assert_eq!(fixture.backend.created(), 2);
    assert_eq!(fixture.backend.live(), 2);
    assert_eq!(fixture.pool.active(), (2, 2));
}

#[tokio::test]
async fn test_every_opened_connection_is_closed_once() {
    init_tracing();
    let fixture = PoolFixture::new(PoolFixture::small_config(), MockBackend::default())
        .await
        .unwrap();

    let conns = vec![
        fixture.pool.get().await.unwrap(),
        fixture.pool.get().await.unwrap(),
        fixture.pool.get().await.unwrap(),
    ];
    for conn in conns {
        conn.release().await;
    }
    fixture.pool.close().await.unwrap();

    assert_eq!(fixture.backend.created(), 3);
    assert_eq!(fixture.backend.closed(), 3);
    assert_eq!(fixture.backend.live(), 0);
}

#[tokio::test]
async fn test_refused_backend_fails_pool_construction() {
    init_tracing();
    let backend = MockBackend::builder().refuse_after(1).build();

    let err = PoolFixture::new(PoolFixture::small_config(), backend.clone())
        .await
        .err()
        .expect("construction should fail");

    match err {
        PoolError::ConnectionCreation(source) => {
            assert_eq!(source.to_string(), MockError::Refused.to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.created(), 1);
    assert_eq!(backend.live(), 0, "partially filled pool must be torn down");
}

#[tokio::test]
async fn test_execute_runs_through_handle() {
    init_tracing();
    let fixture = PoolFixture::new(PoolFixture::small_config(), MockBackend::default())
        .await
        .unwrap();

    let result = fixture
        .pool
        .handle(|conn| Box::pin(async move { conn.execute("hello".into()).await.map_err(BoxError::from) }))
        .await;

    result.unwrap();
    assert_eq!(fixture.backend.payloads(), vec!["hello".to_string()]);
    assert_eq!(fixture.pool.active(), (2, 2));
}
