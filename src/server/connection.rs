//! Per-connection service loop.
//!
//! Each client gets one task: read a frame, dispatch on the command
//! byte, write the encoded reply, repeat. Requests within a connection
//! are strictly serial; the reply is fully written before the next read.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{is_transient, protocol};
use crate::dict::Dictionary;
use crate::encoding::WireEncoding;

pub(super) async fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    dict: Arc<Dictionary>,
    encoding: WireEncoding,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("new client: {peer}");

    let local = match stream.local_addr() {
        Ok(addr) => addr.to_string(),
        Err(e) => {
            error!("local address of {peer} unavailable: {e}");
            return;
        }
    };

    let mut buf = [0u8; protocol::READ_BUF_SIZE];
    let mut reply = String::with_capacity(protocol::REPLY_CAPACITY);

    loop {
        reply.clear();

        let n = tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("client disconnected: {peer}");
                    break;
                }
                Ok(n) => n,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    error!("read from {peer} failed: {e}");
                    return;
                }
            },
        };

        let request = encoding.decode(&buf[..n]);
        match request.as_bytes()[0] {
            protocol::CLIENT_END => {
                info!("client end: {peer}");
                break;
            }
            protocol::CLIENT_REQUEST => {
                let key = protocol::lookup_key(&request);
                debug!("request: key: {key}");

                let candidates = dict.search(key);
                if candidates.is_empty() {
                    protocol::push_not_found(&mut reply, &request);
                    debug!("request: not found");
                } else {
                    protocol::push_found(&mut reply, &candidates);
                    debug!("request: candidates: {}", reply.trim_end());
                }
            }
            protocol::CLIENT_VERSION => {
                debug!("version");
                reply.push_str(protocol::SERVER_VERSION);
            }
            protocol::CLIENT_HOST => {
                debug!("host");
                reply.push_str(&local);
            }
            protocol::CLIENT_COMPLETION => {
                debug!("completion");
                reply.push_str(protocol::COMPLETION_STUB);
            }
            code => {
                // Clients probe with bytes we do not speak; drop the
                // frame without a reply and keep the connection.
                info!(
                    "unknown command from {peer}: {:?} in {request:?}",
                    code as char
                );
                continue;
            }
        }

        let encoded = encoding.encode(&reply);
        if let Err(e) = stream.write_all(&encoded).await {
            error!("write to {peer} failed: {e}");
            return;
        }
    }
}
