use std::net::TcpListener;

use wiremock::MockServer;

/// Starts a wiremock server, or returns `None` when the environment forbids
/// binding localhost sockets so the test can skip instead of failing on
/// infrastructure. `DOWNTRACK_REQUIRE_SOCKET_TESTS=1` turns the skip into a
/// hard failure.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    if socket_tests_required() {
        panic!(
            "cannot bind a localhost socket while DOWNTRACK_REQUIRE_SOCKET_TESTS is set; \
             this environment cannot run wiremock-backed tests"
        );
    }
    eprintln!(
        "[socket-bound-test] cannot bind a localhost socket; skipping. \
         Set DOWNTRACK_REQUIRE_SOCKET_TESTS=1 to fail-fast instead."
    );
    None
}

fn socket_tests_required() -> bool {
    std::env::var("DOWNTRACK_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
