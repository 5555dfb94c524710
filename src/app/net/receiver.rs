use std::{
    io::{self, Read},
    net::{Ipv4Addr, SocketAddr, TcpListener},
    thread,
    time::{Duration, Instant},
};

use super::protocol::ProtocolError;
use crate::app::config::ACCEPT_POLL_MS;

/// The local accept socket every inbound reply arrives on (discovery answers
/// and decode results alike). Callers serialize access through the client's
/// mutex; this type itself assumes exclusive use.
#[derive(Debug)]
pub struct ReceiveSocket {
    port: u16,
    listener: Option<TcpListener>,
}

impl ReceiveSocket {
    /// `port == 0` binds an ephemeral port on first use and keeps it until
    /// the socket is retired.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            listener: None,
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.as_ref().map(|_| self.port)
    }

    /// Binds the socket if it is not bound yet and returns the port.
    pub fn ensure_bound(&mut self) -> io::Result<u16> {
        if self.listener.is_some() {
            return Ok(self.port);
        }
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))?;
        listener.set_nonblocking(true)?;
        self.port = listener.local_addr()?.port();
        log::debug!("net: receive_bound port={}", self.port);
        self.listener = Some(listener);
        Ok(self.port)
    }

    pub fn close(&mut self) {
        if self.listener.take().is_some() {
            log::debug!("net: receive_closed port={}", self.port);
        }
    }

    /// Closes the socket and moves to a fresh ephemeral port on the next bind.
    ///
    /// A reply that missed its deadline is still on its way to the old port;
    /// retiring it makes the late connection fail instead of landing in the
    /// next exchange.
    pub fn retire(&mut self) {
        if self.listener.is_some() {
            log::warn!("net: receive_retired port={}", self.port);
        }
        self.close();
        self.port = 0;
    }

    /// Accepts and drops connections that queued up between exchanges.
    pub fn discard_pending(&mut self) -> io::Result<usize> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(0);
        };
        let mut discarded = 0usize;
        loop {
            match listener.accept() {
                Ok((_, peer)) => {
                    log::warn!("net: stale_connection_discarded peer={peer}");
                    discarded += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Waits up to `accept_timeout` for one inbound connection and returns its
    /// whole body (read until the peer closes).
    pub fn accept_one(
        &mut self,
        accept_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<(SocketAddr, Vec<u8>), ProtocolError> {
        self.ensure_bound()?;
        let Some(listener) = self.listener.as_ref() else {
            return Err(ProtocolError::Io(io::Error::from(io::ErrorKind::NotConnected)));
        };

        let deadline = Instant::now() + accept_timeout;
        let (mut stream, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        log::warn!(
                            "net: accept_timeout port={} after_ms={}",
                            self.port,
                            accept_timeout.as_millis()
                        );
                        self.retire();
                        return Err(ProtocolError::Timeout("inbound connection"));
                    }
                    thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        };

        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(read_timeout))?;
        let mut body = Vec::new();
        match stream.read_to_end(&mut body) {
            Ok(_) => {}
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                self.retire();
                return Err(ProtocolError::Timeout("reply body"));
            }
            Err(err) => return Err(err.into()),
        }
        log::debug!("net: received peer={peer} bytes={}", body.len());
        Ok((peer, body))
    }
}

impl Drop for ReceiveSocket {
    fn drop(&mut self) {
        self.close();
    }
}
