use std::sync::Arc;

use beaver_core::{Session, SessionOptions};

/// An in-memory session backed by a single-connection pool, so every task
/// in the test sees the same database (a multi-connection pool would each
/// get its own private `:memory:` database).
pub async fn setup() -> Arc<Session> {
    Session::open(
        ":memory:",
        SessionOptions {
            cache_enabled: false,
            ..Default::default()
        },
    )
    .await
    .expect("failed to open in-memory session")
}
