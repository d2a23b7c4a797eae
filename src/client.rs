//! Connection driver: opens the transport and runs the protocol's pull
//! loop through deadline-raced reads and writes.

use std::sync::Arc;

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::ConnectionInfo;
use crate::packet::CheckResult;
use crate::protocol::{ClientHandler, ClientProtocol};
use crate::resolver::{Resolver, resolve_single_address};
use crate::timed_stream::{read_exact_with_deadline, write_all_with_deadline};

/// Submits all `results` over a single connection, pipelining after the
/// handshake. Returns the protocol's terminal status: `true` on success,
/// `false` when a deadline was exceeded (the connection has been closed).
/// Transport errors propagate as `Err`, distinct from timeouts.
pub async fn submit_results(
    info: &ConnectionInfo,
    resolver: &Arc<dyn Resolver>,
    results: Vec<CheckResult>,
) -> std::io::Result<bool> {
    let mut queue = results.into_iter();
    let Some(first) = queue.next() else {
        warn!("no check results to submit");
        return Ok(true);
    };

    let server_addr = resolve_single_address(resolver, &info.location).await?;
    debug!("connecting to {server_addr}");
    let mut stream = TcpStream::connect(server_addr).await?;

    let handler: Arc<dyn ClientHandler> = Arc::new(info.clone());
    let mut protocol = ClientProtocol::new(handler);
    protocol.prepare_request(first);
    protocol.on_connect();

    loop {
        if protocol.wants_data() {
            let inbound = protocol.get_inbound();
            let inbound_len = inbound.len();
            if !read_exact_with_deadline(&mut stream, inbound, info.timeout).await? {
                warn!("timed out waiting for handshake from {}", info.location);
                protocol.mark_done();
                return Ok(protocol.get_timeout_response());
            }
            protocol.on_read(inbound_len)?;
        } else if protocol.has_data() {
            let outbound = protocol.get_outbound()?;
            if !write_all_with_deadline(&mut stream, &outbound, info.timeout).await? {
                warn!("timed out sending check result to {}", info.location);
                protocol.mark_done();
                return Ok(protocol.get_timeout_response());
            }
            protocol.on_write(outbound.len());

            match queue.next() {
                Some(result) => protocol.prepare_request(result),
                None => break,
            }
        } else {
            break;
        }
    }

    protocol.mark_done();
    let _ = stream.shutdown().await;
    Ok(protocol.get_response())
}
