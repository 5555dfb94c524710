use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::{
    discovery::{
        interface_netmask, local_ipv4, send_sniff, sniff_message, subnet_broadcast, Endpoint,
    },
    protocol::{DecodeRequest, DecodeResponse, ProtocolError, ProtocolMessage},
    receiver::ReceiveSocket,
};
use crate::app::{config::ProtocolConfig, types::CandidateList};

/// Results delivered back to the interaction thread.
#[derive(Debug)]
pub enum NetEvent {
    ServerFound(Endpoint),
    ServerUnreachable(ProtocolError),
    Decoded {
        seq: u64,
        candidates: CandidateList,
    },
    DecodeFailed {
        seq: u64,
        error: ProtocolError,
    },
}

/// Client of the decode service.
///
/// Every call runs on its own worker thread and reports through the event
/// channel. Calls that wait for an inbound connection (discovery and decode)
/// hold the receive socket for their whole exchange, so a reply can only ever
/// be accepted by the request that is waiting for it.
#[derive(Clone)]
pub struct DecodeClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ProtocolConfig,
    endpoint: Mutex<Option<Endpoint>>,
    receiver: Mutex<ReceiveSocket>,
    events: Sender<NetEvent>,
    next_seq: AtomicU64,
}

impl DecodeClient {
    pub fn new(config: ProtocolConfig, events: Sender<NetEvent>) -> Result<Self, ProtocolError> {
        let endpoint = config
            .server
            .as_deref()
            .map(str::parse::<Endpoint>)
            .transpose()?;
        let receiver = ReceiveSocket::new(config.receive_port);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoint: Mutex::new(endpoint),
                receiver: Mutex::new(receiver),
                events,
                next_seq: AtomicU64::new(0),
            }),
        })
    }

    pub fn with_channel(config: ProtocolConfig) -> Result<(Self, Receiver<NetEvent>), ProtocolError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Ok((Self::new(config, tx)?, rx))
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.lock().clone()
    }

    pub fn set_endpoint(&self, endpoint: Endpoint) {
        log::info!("net: endpoint_set endpoint={endpoint}");
        *self.inner.endpoint.lock() = Some(endpoint);
    }

    /// Port of the receive socket once it has been bound.
    pub fn reply_port(&self) -> Option<u16> {
        self.inner.receiver.lock().local_port()
    }

    /// Broadcasts the sniff message in the background; reports
    /// [`NetEvent::ServerFound`] or [`NetEvent::ServerUnreachable`].
    pub fn discover(&self) {
        let client = self.clone();
        let spawned = thread::Builder::new()
            .name("net-discover".to_string())
            .spawn(move || {
                let event = match client.discover_blocking() {
                    Ok(endpoint) => NetEvent::ServerFound(endpoint),
                    Err(err) => NetEvent::ServerUnreachable(err),
                };
                client.emit(event);
            });
        if let Err(err) = spawned {
            log::warn!("net: spawn_failed task=discover err={err}");
            self.emit(NetEvent::ServerUnreachable(err.into()));
        }
    }

    pub fn discover_blocking(&self) -> Result<Endpoint, ProtocolError> {
        let config = &self.inner.config;
        let mut receiver = self.inner.receiver.lock();
        let port = receiver.ensure_bound()?;
        receiver.discard_pending()?;
        let target = self.sniff_target()?;
        send_sniff(target, &sniff_message(&config.sniff_prefix, port))?;

        let result = receiver
            .accept_one(config.accept_timeout(), config.io_timeout())
            .and_then(|(_, body)| {
                let text = String::from_utf8(body)
                    .map_err(|_| ProtocolError::Malformed("non-utf8 discovery reply".into()))?;
                text.parse::<Endpoint>()
            });
        match result {
            Ok(endpoint) => {
                log::info!("net: server_found endpoint={endpoint}");
                *self.inner.endpoint.lock() = Some(endpoint.clone());
                Ok(endpoint)
            }
            Err(err) => {
                log::warn!("net: server_unreachable reason={err}");
                Err(err)
            }
        }
    }

    /// Sends a decode request in the background and returns its sequence
    /// number. The reply arrives as [`NetEvent::Decoded`] or
    /// [`NetEvent::DecodeFailed`] tagged with the same number.
    pub fn request_decode(&self, request: DecodeRequest) -> u64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let client = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("net-decode-{seq}"))
            .spawn(move || {
                let event = match client.decode_blocking(request) {
                    Ok(candidates) => {
                        log::info!("net: decoded seq={seq} candidates={}", candidates.len());
                        NetEvent::Decoded { seq, candidates }
                    }
                    Err(error) => {
                        log::warn!("net: decode_failed seq={seq} reason={error}");
                        NetEvent::DecodeFailed { seq, error }
                    }
                };
                client.emit(event);
            });
        if let Err(err) = spawned {
            log::warn!("net: spawn_failed task=decode seq={seq} err={err}");
            self.emit(NetEvent::DecodeFailed {
                seq,
                error: err.into(),
            });
        }
        seq
    }

    pub fn decode_blocking(&self, mut request: DecodeRequest) -> Result<CandidateList, ProtocolError> {
        let endpoint = self.endpoint().ok_or(ProtocolError::NoEndpoint)?;
        let config = &self.inner.config;

        let mut receiver = self.inner.receiver.lock();
        request.reply_port = receiver.ensure_bound()?;
        receiver.discard_pending()?;
        log::debug!(
            "net: decode_send endpoint={endpoint} task={} points={} reply_port={}",
            request.task.as_str(),
            request.points.len(),
            request.reply_port
        );
        let body = ProtocolMessage::Decode(request).encode()?;
        self.send(&endpoint, &body)?;

        let (_, reply) = receiver.accept_one(config.accept_timeout(), config.io_timeout())?;
        DecodeResponse::parse(&reply)
    }

    /// Fire-and-forget task notification; failures are only logged.
    pub fn notify(&self, message: ProtocolMessage) {
        let client = self.clone();
        let task = message.task();
        let spawned = thread::Builder::new()
            .name(format!("net-notify-{}", task.to_ascii_lowercase()))
            .spawn(move || {
                if let Err(err) = client.notify_blocking(&message) {
                    log::warn!("net: notify_failed task={} reason={err}", message.task());
                }
            });
        if let Err(err) = spawned {
            log::warn!("net: spawn_failed task={task} err={err}");
        }
    }

    pub fn notify_blocking(&self, message: &ProtocolMessage) -> Result<(), ProtocolError> {
        let endpoint = self.endpoint().ok_or(ProtocolError::NoEndpoint)?;
        let body = message.encode()?;
        self.send(&endpoint, &body)?;
        log::debug!("net: notified task={} endpoint={endpoint}", message.task());
        Ok(())
    }

    pub fn confirm(&self, word: impl Into<String>) {
        self.notify(ProtocolMessage::Confirm { word: word.into() });
    }

    pub fn undo(&self, banned_words: Vec<String>) {
        self.notify(ProtocolMessage::Undo { banned_words });
    }

    fn send(&self, endpoint: &Endpoint, body: &[u8]) -> Result<(), ProtocolError> {
        let timeout = self.inner.config.io_timeout();
        let addr = endpoint.resolve()?;
        let mut stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|err| timed_out(err, "connect"))?;
        stream.set_write_timeout(Some(timeout))?;
        stream
            .write_all(body)
            .map_err(|err| timed_out(err, "request write"))?;
        // End of message is signalled by closing our side.
        stream.shutdown(Shutdown::Write)?;
        Ok(())
    }

    fn sniff_target(&self) -> Result<SocketAddr, ProtocolError> {
        let config = &self.inner.config;
        let broadcast = match config.broadcast_addr {
            Some(addr) => addr,
            None => subnet_broadcast(local_ipv4()?, config.netmask, interface_netmask),
        };
        Ok(SocketAddr::from((broadcast, config.discovery_port)))
    }

    fn emit(&self, event: NetEvent) {
        if self.inner.events.send(event).is_err() {
            log::debug!("net: event_dropped reason=receiver_closed");
        }
    }
}

fn timed_out(err: io::Error, what: &'static str) -> ProtocolError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::Timeout(what),
        _ => ProtocolError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, time::Duration};

    use super::*;
    use crate::app::net::protocol::DecodeTask;

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            receive_port: 0,
            accept_timeout_ms: 100,
            io_timeout_ms: 200,
            broadcast_addr: Some(Ipv4Addr::LOCALHOST),
            ..ProtocolConfig::default()
        }
    }

    #[test]
    fn configured_server_is_parsed() {
        let mut cfg = config();
        cfg.server = Some("10.0.0.9:10086".to_string());
        let (client, _events) = DecodeClient::with_channel(cfg).expect("client");
        assert_eq!(client.endpoint(), Some(Endpoint::new("10.0.0.9", 10086)));

        let mut cfg = config();
        cfg.server = Some("no-port".to_string());
        assert!(matches!(
            DecodeClient::with_channel(cfg),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn decode_without_endpoint_fails_with_sequence() {
        let (client, events) = DecodeClient::with_channel(config()).expect("client");
        let seq = client.request_decode(DecodeRequest {
            task: DecodeTask::Decode,
            ..DecodeRequest::default()
        });
        assert_eq!(seq, 1);
        match events.recv_timeout(Duration::from_secs(2)).expect("event") {
            NetEvent::DecodeFailed { seq: 1, error } => {
                assert!(matches!(error, ProtocolError::NoEndpoint));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(client.request_decode(DecodeRequest::default()), 2);
    }

    #[test]
    fn notify_without_endpoint_is_silent() {
        let (client, events) = DecodeClient::with_channel(config()).expect("client");
        client.confirm("word");
        client.undo(vec!["a".to_string()]);
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(matches!(
            client.notify_blocking(&ProtocolMessage::Confirm {
                word: "word".to_string()
            }),
            Err(ProtocolError::NoEndpoint)
        ));
    }
}
