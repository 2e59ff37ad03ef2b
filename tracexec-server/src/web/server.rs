use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::state::State;
use crate::web::app::App;

/// Runs the emulator HTTP server.
///
/// Binds to the configured address and serves until a termination signal arrives. Workloads that
/// are running at that point complete and get their responses before the server exits.
pub async fn server(config: Config) -> Result<()> {
    let listener = listen(config.http_addr, config.listen_backlog)
        .context("failed to start TCP listener")?;
    tracing::info!(
        addr = %config.http_addr,
        max_blocking_threads = config.runtime.max_blocking_threads,
        "emulator listening"
    );

    let state = State::new(config);
    let app = App::new(state.clone()).graceful_shutdown(true);
    let server_handle = tokio::spawn(app.serve(listener));

    let drain_state = state.clone();
    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!(running = drain_state.running(), "draining workloads");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!(running = state.running(), "emulator stopped");
    server_result
}

/// Binds a listen socket with port reuse, so several emulators can share one port.
fn listen(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    Ok(socket.listen(backlog)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listen_shares_port() {
        let first = listen(SocketAddr::from(([127, 0, 0, 1], 0)), 16).unwrap();
        let addr = first.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        listen(addr, 16).unwrap();
    }
}
