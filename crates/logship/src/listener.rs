// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP listener receiving log datagrams.
//!
//! Each datagram is decoded and enqueued inline, on the same task as the
//! socket reads, so a full queue directly slows down ingestion.

use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::decoder::{peer_host, Decoder};
use crate::errors::ListenerError;

// Datagrams larger than this are truncated by the socket
pub const MAX_DATAGRAM_SIZE: usize = 32 * 1024;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";

#[cfg(test)]
type Script = std::sync::Arc<
    std::sync::Mutex<std::collections::VecDeque<io::Result<(Vec<u8>, SocketAddr)>>>,
>;

// BufferReader abstracts where datagrams come from.
enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Replays a fixed sequence of reads, then waits forever.
    #[cfg(test)]
    Scripted(Script),
}

impl BufferReader {
    /// Reads the next datagram into `buf`. Blocks until one arrives.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => socket.recv_from(buf).await,
            #[cfg(test)]
            BufferReader::Scripted(reads) => {
                let next = reads.lock().expect("script lock poisoned").pop_front();
                match next {
                    Some(Ok((data, src))) => {
                        let amt = data.len().min(buf.len());
                        buf[..amt].copy_from_slice(&data[..amt]);
                        Ok((amt, src))
                    }
                    Some(Err(e)) => Err(e),
                    None => std::future::pending().await,
                }
            }
        }
    }
}

/// Receives datagrams and feeds them to the [`Decoder`].
pub struct Listener {
    cancel_token: CancellationToken,
    decoder: Decoder,
    buffer_reader: BufferReader,
    local_addr: Option<SocketAddr>,
}

impl Listener {
    /// Resolves `addr` and binds a UDP socket to it.
    ///
    /// Failing to resolve or bind is fatal for the daemon, so both are
    /// reported to the caller instead of being retried.
    pub async fn bind(
        addr: &str,
        decoder: Decoder,
        cancel_token: CancellationToken,
    ) -> Result<Listener, ListenerError> {
        let resolved = tokio::net::lookup_host(bind_target(addr).as_ref())
            .await
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no addresses found")
                })
            })
            .map_err(|source| ListenerError::Resolve {
                addr: addr.to_string(),
                source,
            })?;

        let socket = tokio::net::UdpSocket::bind(resolved)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr().ok();

        Ok(Listener {
            cancel_token,
            decoder,
            buffer_reader: BufferReader::UdpSocket(socket),
            local_addr,
        })
    }

    /// Address the socket is bound to. Useful when binding to port 0.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Receive loop. Runs until cancelled or until the queue is closed.
    pub async fn spin(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let read = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                read = self.buffer_reader.read(&mut buf) => read,
            };

            match read {
                Ok((amt, src)) => {
                    if !self.consume(&buf[..amt], src).await {
                        break;
                    }
                }
                // UDP has no end of stream; only report real failures
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => warn!("unable to read from {}: {}", self.describe(), e),
            }
        }
        debug!("listener on {} stopped", self.describe());
    }

    /// Decodes and enqueues one datagram. Returns false when the loop should stop.
    async fn consume(&self, datagram: &[u8], src: SocketAddr) -> bool {
        let host = peer_host(&src);
        trace!("received {} bytes from {}", datagram.len(), src);

        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => {
                debug!("dropping datagram from {} on shutdown", host);
                false
            }
            pushed = self.decoder.decode(&host, datagram) => match pushed {
                Ok(()) => true,
                Err(e) => {
                    error!("unable to queue event from {}: {}", host, e);
                    false
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.local_addr
            .map_or_else(|| "<unbound>".to_string(), |addr| addr.to_string())
    }
}

// ":5000" listens on every IPv4 interface
fn bind_target(addr: &str) -> Cow<'_, str> {
    if addr.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{addr}"))
    } else {
        Cow::Borrowed(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::normalize;
    use crate::queue::{self, QueueHandle, QueueReceiver};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn frozen_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 54321)
    }

    fn script(reads: Vec<io::Result<(Vec<u8>, SocketAddr)>>) -> Script {
        Arc::new(Mutex::new(VecDeque::from(reads)))
    }

    fn listener_over(script: Script, handle: QueueHandle) -> (Listener, CancellationToken) {
        let cancel_token = CancellationToken::new();
        let listener = Listener {
            cancel_token: cancel_token.clone(),
            decoder: Decoder::with_clock(handle, frozen_clock),
            buffer_reader: BufferReader::Scripted(script),
            local_addr: None,
        };
        (listener, cancel_token)
    }

    fn scripted_listener(
        reads: Vec<io::Result<(Vec<u8>, SocketAddr)>>,
        capacity: usize,
    ) -> (Listener, QueueReceiver, CancellationToken) {
        let (handle, receiver) = queue::channel(capacity).expect("queue creation failed");
        let (listener, cancel_token) = listener_over(script(reads), handle);
        (listener, receiver, cancel_token)
    }

    async fn spin_briefly(listener: Listener, cancel_token: CancellationToken) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel_token.cancel();
        });
        listener.spin().await;
    }

    #[tokio::test]
    async fn test_datagrams_are_decoded_in_order() {
        let (listener, mut receiver, cancel_token) = scripted_listener(
            vec![
                Ok((br#"{"msg":"hello"}"#.to_vec(), peer())),
                Ok((b"not json at all".to_vec(), peer())),
            ],
            8,
        );

        spin_briefly(listener, cancel_token).await;

        let first = receiver.pop().await.expect("missing first event");
        assert_eq!(
            first,
            normalize("10.0.0.5", br#"{"msg":"hello"}"#, frozen_clock())
        );
        let second = receiver.pop().await.expect("missing second event");
        assert_eq!(second.fields()["message"], json!("not json at all"));
        assert_eq!(second.fields()["host"], json!("10.0.0.5"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_read_error_does_not_stop_loop() {
        let (listener, mut receiver, cancel_token) = scripted_listener(
            vec![
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof")),
                Ok((b"after the error".to_vec(), peer())),
            ],
            8,
        );

        spin_briefly(listener, cancel_token).await;

        assert!(logs_contain("unable to read from"));
        assert!(logs_contain("reset by peer"));
        assert!(!logs_contain("eof"));
        let event = receiver.pop().await.expect("loop stopped after read error");
        assert_eq!(event.fields()["message"], json!("after the error"));
    }

    #[tokio::test]
    async fn test_full_queue_stalls_reads() {
        let reads = script(vec![
            Ok((b"one".to_vec(), peer())),
            Ok((b"two".to_vec(), peer())),
            Ok((b"three".to_vec(), peer())),
        ]);
        let remaining = || reads.lock().unwrap().len();
        let (handle, mut receiver) = queue::channel(1).expect("queue creation failed");
        let (listener, cancel_token) = listener_over(Arc::clone(&reads), handle.clone());
        let task = tokio::spawn(listener.spin());

        // "one" fills the queue, "two" waits on the push, "three" is never read
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.len(), 1);
        assert_eq!(remaining(), 1);

        let event = receiver.pop().await.expect("missing event");
        assert_eq!(event.fields()["message"], json!("one"));

        // Freeing a slot lets "two" in and the loop moves on to "three"
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.len(), 1);
        assert_eq!(remaining(), 0);

        for expected in ["two", "three"] {
            let event = receiver.pop().await.expect("missing event");
            assert_eq!(event.fields()["message"], json!(expected));
        }

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("listener ignored cancellation")
            .expect("listener task panicked");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_closed_queue_stops_loop() {
        let (listener, receiver, _cancel_token) =
            scripted_listener(vec![Ok((b"orphan".to_vec(), peer()))], 1);
        drop(receiver);

        tokio::time::timeout(Duration::from_secs(1), listener.spin())
            .await
            .expect("listener kept running without a consumer");
        assert!(logs_contain("unable to queue event from 10.0.0.5"));
    }

    #[tokio::test]
    async fn test_bind_and_receive_over_udp() {
        let (handle, mut receiver) = queue::channel(8).expect("queue creation failed");
        let cancel_token = CancellationToken::new();
        let listener = Listener::bind("127.0.0.1:0", Decoder::new(handle), cancel_token.clone())
            .await
            .expect("bind failed");
        let addr = listener.local_addr().expect("no local address");
        tokio::spawn(listener.spin());

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("unable to bind sender");
        sender
            .send_to(br#"{"level":"info"}"#, addr)
            .await
            .expect("send failed");

        let event = tokio::time::timeout(Duration::from_secs(1), receiver.pop())
            .await
            .expect("no datagram received")
            .expect("queue closed");
        assert_eq!(event.fields()["level"], json!("info"));
        assert_eq!(event.fields()["host"], json!("127.0.0.1"));

        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").expect("unable to bind");
        let addr = taken.local_addr().expect("no local address").to_string();

        let (handle, _receiver) = queue::channel(1).expect("queue creation failed");
        let result = Listener::bind(&addr, Decoder::new(handle), CancellationToken::new()).await;

        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_bind_empty_host_listens_on_all_interfaces() {
        let (handle, mut receiver) = queue::channel(1).expect("queue creation failed");
        let cancel_token = CancellationToken::new();
        let listener = Listener::bind(":0", Decoder::new(handle), cancel_token.clone())
            .await
            .expect("bind failed");
        let addr = listener.local_addr().expect("no local address");
        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
        tokio::spawn(listener.spin());

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("unable to bind sender");
        sender
            .send_to(b"hi", ("127.0.0.1", addr.port()))
            .await
            .expect("send failed");

        let event = tokio::time::timeout(Duration::from_secs(1), receiver.pop())
            .await
            .expect("no datagram received")
            .expect("queue closed");
        assert_eq!(event.fields()["host"], json!("127.0.0.1"));

        cancel_token.cancel();
    }

    #[test]
    fn test_bind_target() {
        assert_eq!(bind_target(":5000"), "0.0.0.0:5000");
        assert_eq!(bind_target("127.0.0.1:5000"), "127.0.0.1:5000");
        assert_eq!(bind_target("[::]:5000"), "[::]:5000");
    }

    #[tokio::test]
    async fn test_bind_unresolvable_address() {
        let (handle, _receiver) = queue::channel(1).expect("queue creation failed");
        let result =
            Listener::bind("missing-port", Decoder::new(handle), CancellationToken::new()).await;

        match result {
            Err(ListenerError::Resolve { addr, .. }) => assert_eq!(addr, "missing-port"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bind unexpectedly succeeded"),
        }
    }
}
