use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

use crate::error::PortError;

/// Consecutive ports tried before giving up.
pub const MAX_PORT_ATTEMPTS: u32 = 200;

/// Interval between liveness probes while waiting on a port.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Return the first port `>= start` that can be bound on localhost.
/// Port 0 is never returned: the search starts at 1.
///
/// The probe listener is dropped before returning, so the port is free again
/// for the caller. The search is bounded by [`MAX_PORT_ATTEMPTS`] and never
/// walks past `u16::MAX`.
pub fn find_available_port(start: u16) -> Result<u16, PortError> {
    find_available_port_with(start, MAX_PORT_ATTEMPTS)
}

/// [`find_available_port`] with an explicit attempt cap.
pub fn find_available_port_with(start: u16, max_attempts: u32) -> Result<u16, PortError> {
    // Binding 0 yields an OS-chosen ephemeral port.
    let start = start.max(1);
    let end = (u32::from(start) + max_attempts).min(u32::from(u16::MAX) + 1);

    for candidate in u32::from(start)..end {
        let port = candidate as u16;
        match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))) {
            Ok(listener) => {
                drop(listener);
                return Ok(port);
            }
            Err(err) => {
                tracing::debug!(port, error = %err, "port unavailable");
            }
        }
    }

    Err(PortError::NoAvailablePort {
        start,
        end,
        attempts: end - u32::from(start),
    })
}

/// True when something accepts TCP connections on `127.0.0.1:port`.
pub async fn is_listening(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Poll until connection attempts to `port` fail, i.e. the previous owner let go.
pub async fn wait_for_release(port: u16, budget: Duration) -> Result<(), PortError> {
    wait_until(port, budget, false).await
}

/// Poll until `port` accepts connections.
pub async fn wait_for_listen(port: u16, budget: Duration) -> Result<(), PortError> {
    wait_until(port, budget, true).await
}

async fn wait_until(port: u16, budget: Duration, listening: bool) -> Result<(), PortError> {
    let deadline = Instant::now() + budget;
    loop {
        if is_listening(port).await == listening {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PortError::Timeout {
                port,
                expected: if listening { "listening" } else { "released" },
                waited: budget,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}
