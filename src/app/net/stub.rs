//! In-process stand-in for the decode service.
//!
//! Answers sniff broadcasts, replies to decode requests with a fixed ranked
//! word list (minus the banned words of the request) and records every
//! message it receives. Replies go out the way the real service sends them:
//! on a new connection to the requesting host at the request's `PORT`.

use std::{
    io::{self, Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use super::{
    discovery::{parse_sniff, Endpoint},
    protocol::{DecodeResponse, DecodeTask, ProtocolError, ProtocolMessage},
};
use crate::app::{
    config::{ACCEPT_POLL_MS, SNIFF_PREFIX},
    types::{Candidate, CandidateList},
};

const STUB_IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct StubConfig {
    /// Ranked answer for `DECODE`.
    pub words: Vec<String>,
    /// Ranked answer for `CMD_DECODE`.
    pub command_words: Vec<String>,
    pub decode_addr: SocketAddr,
    /// UDP address to answer sniffs on; `None` disables discovery.
    pub sniff_addr: Option<SocketAddr>,
    /// Host written into discovery answers. Defaults to the decode listener's ip.
    pub advertise_host: Option<String>,
    pub sniff_prefix: String,
    /// Delay before each decode reply.
    pub reply_delay: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            words: ["the", "they", "then", "there", "these", "them", "than", "that", "this"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            command_words: ["copy", "paste", "undo", "redo", "select"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            decode_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            sniff_addr: None,
            advertise_host: None,
            sniff_prefix: SNIFF_PREFIX.to_string(),
            reply_delay: Duration::ZERO,
        }
    }
}

/// Ranked candidates for `words`, skipping `banned`. Scores fall off with rank.
pub fn rank_words(words: &[String], banned: &[String]) -> CandidateList {
    CandidateList::new(
        words
            .iter()
            .filter(|w| !banned.contains(*w))
            .enumerate()
            .map(|(rank, word)| Candidate {
                word: word.clone(),
                score: 1.0 / (rank as f64 + 1.0),
            })
            .collect(),
    )
}

pub struct StubDecodeService {
    decode_addr: SocketAddr,
    sniff_addr: Option<SocketAddr>,
    advertise_host: String,
    received: Arc<Mutex<Vec<ProtocolMessage>>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl StubDecodeService {
    pub fn start(config: StubConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.decode_addr)?;
        listener.set_nonblocking(true)?;
        let decode_addr = listener.local_addr()?;
        let advertise_host = config
            .advertise_host
            .clone()
            .unwrap_or_else(|| decode_addr.ip().to_string());

        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::new();

        let sniff_addr = match config.sniff_addr {
            Some(addr) => {
                let socket = UdpSocket::bind(addr)?;
                socket.set_read_timeout(Some(Duration::from_millis(50)))?;
                let bound = socket.local_addr()?;
                let answer = format!("{advertise_host}:{}", decode_addr.port());
                let prefix = config.sniff_prefix.clone();
                let shutdown = Arc::clone(&shutdown);
                workers.push(
                    thread::Builder::new()
                        .name("stub-sniff".to_string())
                        .spawn(move || serve_sniff(socket, &prefix, &answer, &shutdown))?,
                );
                Some(bound)
            }
            None => None,
        };

        {
            let received = Arc::clone(&received);
            let shutdown = Arc::clone(&shutdown);
            workers.push(
                thread::Builder::new()
                    .name("stub-decode".to_string())
                    .spawn(move || serve_decode(listener, &config, &received, &shutdown))?,
            );
        }

        log::info!("stub: listening decode={decode_addr} sniff={sniff_addr:?}");
        Ok(Self {
            decode_addr,
            sniff_addr,
            advertise_host,
            received,
            shutdown,
            workers,
        })
    }

    pub fn decode_addr(&self) -> SocketAddr {
        self.decode_addr
    }

    pub fn sniff_addr(&self) -> Option<SocketAddr> {
        self.sniff_addr
    }

    /// The endpoint the stub advertises in discovery answers.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.advertise_host.clone(), self.decode_addr.port())
    }

    /// Messages received so far, in arrival order.
    pub fn received(&self) -> Vec<ProtocolMessage> {
        self.received.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("stub: worker_panicked");
            }
        }
    }
}

impl Drop for StubDecodeService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_sniff(socket: UdpSocket, prefix: &str, answer: &str, shutdown: &AtomicBool) {
    let mut buf = [0u8; 256];
    while !shutdown.load(Ordering::Acquire) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if is_timeout(&err) => continue,
            Err(err) => {
                log::warn!("stub: sniff_recv_failed err={err}");
                continue;
            }
        };
        let Some(reply_port) = parse_sniff(prefix, &buf[..len]) else {
            log::debug!("stub: sniff_ignored peer={peer}");
            continue;
        };
        log::info!("stub: sniff peer={peer} reply_port={reply_port}");
        if let Err(err) = write_to(SocketAddr::new(peer.ip(), reply_port), answer.as_bytes()) {
            log::warn!("stub: sniff_answer_failed peer={peer} err={err}");
        }
    }
}

fn serve_decode(
    listener: TcpListener,
    config: &StubConfig,
    received: &Mutex<Vec<ProtocolMessage>>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_request(stream, peer.ip(), config, received) {
                    log::warn!("stub: request_failed peer={peer} err={err}");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
            }
            Err(err) => {
                log::warn!("stub: accept_failed err={err}");
                thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
            }
        }
    }
}

fn handle_request(
    mut stream: TcpStream,
    peer: IpAddr,
    config: &StubConfig,
    received: &Mutex<Vec<ProtocolMessage>>,
) -> Result<(), ProtocolError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(STUB_IO_TIMEOUT))?;
    let mut body = Vec::new();
    stream.read_to_end(&mut body)?;
    drop(stream);

    let message = ProtocolMessage::decode(&body)?;
    log::info!("stub: received task={} peer={peer}", message.task());
    received.lock().push(message.clone());

    let ProtocolMessage::Decode(request) = message else {
        return Ok(());
    };
    let vocabulary = match request.task {
        DecodeTask::Decode => &config.words,
        DecodeTask::CmdDecode => &config.command_words,
    };
    let candidates = rank_words(vocabulary, &request.banned_words);
    if !config.reply_delay.is_zero() {
        thread::sleep(config.reply_delay);
    }
    let reply = DecodeResponse::from_candidates(&candidates).encode()?;
    write_to(SocketAddr::new(peer, request.reply_port), &reply)?;
    log::debug!(
        "stub: replied peer={peer} port={} candidates={}",
        request.reply_port,
        candidates.len()
    );
    Ok(())
}

fn write_to(addr: SocketAddr, body: &[u8]) -> io::Result<()> {
    let mut stream = TcpStream::connect_timeout(&addr, STUB_IO_TIMEOUT)?;
    stream.set_write_timeout(Some(STUB_IO_TIMEOUT))?;
    stream.write_all(body)?;
    stream.flush()
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn banned_words_are_removed_and_ranks_close_up() {
        let ranked = rank_words(&words(&["a", "b", "c", "d"]), &words(&["b", "zzz"]));
        assert_eq!(ranked.words().collect::<Vec<_>>(), vec!["a", "c", "d"]);
        let scores: Vec<f64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![1.0, 0.5, 1.0 / 3.0]);
    }

    #[test]
    fn stub_records_notifications() {
        let stub = StubDecodeService::start(StubConfig::default()).expect("stub");
        let body = ProtocolMessage::Confirm {
            word: "then".to_string(),
        }
        .encode()
        .expect("encode");
        write_to(stub.decode_addr(), &body).expect("send");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while stub.received().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            stub.received(),
            vec![ProtocolMessage::Confirm {
                word: "then".to_string()
            }]
        );
        stub.shutdown();
    }
}
