//! Exposes an in-process emulator server for use in integration tests.
//!
//! ```
//! use tracexec_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};

use tracexec_server::config::Config;
use tracexec_server::state::State;
use tracexec_server::web::App;

/// An in-process emulator server for use in integration tests.
///
/// It listens on a random available port on localhost and is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Starts a server with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Starts a server with the given configuration.
    ///
    /// The configured `http_addr` is ignored in favor of a random local port.
    pub async fn with_config(config: Config) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let app = App::new(State::new(config));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses the IPv4 loopback address as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://{}/{}", self.socket, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
