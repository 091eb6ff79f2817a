//! Unix-socket transport loop.
//!
//! One task per connection.  The stream is framed by the PDU header: read
//! two bytes, then exactly `payload_len` more, hand the frame to the
//! dispatcher, write back whatever it produced.  Peer credentials are
//! captured once per connection (`SO_PEERCRED`) and flow into the register
//! handler for retransmission detection.

use crate::dispatch::Gateway;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use tb_protocol::{HEADER_LEN, PDU_MAX, RESPONSE_MAX};

/// Accept connections forever, spawning a serving task per stream.
pub async fn run(listener: UnixListener, gateway: Arc<Gateway>) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let gateway = gateway.clone();
        tokio::spawn(async move {
            serve_connection(stream, gateway).await;
        });
    }
}

async fn serve_connection(mut stream: UnixStream, gateway: Arc<Gateway>) {
    let handle = stream.as_raw_fd();
    let peer_pid = stream.peer_cred().ok().and_then(|cred| cred.pid());
    debug!(handle, ?peer_pid, "connection accepted");

    let mut frame = [0u8; PDU_MAX];
    let mut out = [0u8; RESPONSE_MAX];

    loop {
        match stream.read_exact(&mut frame[..HEADER_LEN]).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!(handle, %e, "header read failed");
                break;
            }
        }
        let payload_len = frame[1] as usize;
        if payload_len > 0 {
            if let Err(e) = stream
                .read_exact(&mut frame[HEADER_LEN..HEADER_LEN + payload_len])
                .await
            {
                warn!(handle, %e, "body read failed");
                break;
            }
        }
        let total = HEADER_LEN + payload_len;

        match gateway.process(handle, peer_pid, &frame[..total], &mut out).await {
            Ok(0) => {}
            Ok(n) => {
                if let Err(e) = stream.write_all(&out[..n]).await {
                    warn!(handle, %e, "response write failed");
                    break;
                }
            }
            Err(e) => {
                // Framing is broken; the stream can no longer be trusted.
                warn!(handle, %e, "dropping connection on malformed PDU");
                break;
            }
        }
    }

    gateway.connection_closed(handle).await;
    debug!(handle, "connection closed");
}
