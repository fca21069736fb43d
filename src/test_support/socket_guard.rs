//! Lets mock-service tests skip where localhost sockets cannot be bound.
//!
//! Set `DOI_MANAGER_REQUIRE_SOCKET_TESTS=1` to fail instead of skipping.
//! Integration tests include this file through `tests/support/mod.rs`.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "DOI_MANAGER_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock service, or returns `None` when this environment cannot
/// bind localhost.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }
    assert!(
        !sockets_required(),
        "cannot bind a localhost socket and {REQUIRE_ENV} is set"
    );
    eprintln!("skipping mock-service test: cannot bind a localhost socket ({REQUIRE_ENV}=1 fails instead)");
    None
}
