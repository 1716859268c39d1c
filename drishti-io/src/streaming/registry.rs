//! Connection registry: listener, client sockets and broadcast
//!
//! All sockets are non-blocking. The registry is polled once per cycle by the
//! orchestration loop; nothing here ever waits on a single client.
//!
//! # Slow clients
//!
//! Broadcast appends the message to each client's outbound queue and writes
//! as much as the socket accepts. A client whose queue stops draining for
//! longer than `send_timeout`, or whose queue grows past `max_pending_bytes`,
//! is disconnected. Other clients are unaffected and per-client byte order is
//! preserved.
//!
//! ```text
//! broadcast(bytes)
//!   for client in registry order:
//!     queue += bytes ── over cap? ──▶ remove
//!     write(queue)   ── error?    ──▶ remove
//!                    ── WouldBlock ─▶ stalled since t0; remove once t0 + send_timeout passes
//! ```

use crate::error::{Error, Result};
use log::{debug, error, info, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Registry-assigned client identifier, unique for the process lifetime
pub type ClientId = u64;

/// Socket behaviour limits
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    /// Longest an outbound queue may fail to drain
    pub send_timeout: Duration,
    /// Largest outbound queue per client
    pub max_pending_bytes: usize,
    /// Bytes requested per read call
    pub read_chunk_bytes: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(500),
            max_pending_bytes: 32 * 1024 * 1024,
            read_chunk_bytes: 4096,
        }
    }
}

/// Result of a non-blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes appended to the inbound buffer
    pub bytes: usize,
    /// Peer closed its side
    pub closed: bool,
}

/// One connected client
#[derive(Debug)]
pub struct Client {
    pub(crate) id: ClientId,
    pub(crate) addr: SocketAddr,
    stream: TcpStream,
    /// Received bytes not yet forming a complete message
    pub(crate) inbound: Vec<u8>,
    /// When the inbound buffer last became non-empty
    pub(crate) partial_since: Option<Instant>,
    outbound: Vec<u8>,
    stalled_since: Option<Instant>,
}

/// Readiness observed by [`ConnectionRegistry::poll_readable`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollEvents {
    /// Clients accepted during this poll
    pub admitted: Vec<ClientId>,
    /// Clients with bytes (or EOF) waiting
    pub readable: Vec<ClientId>,
    /// Clients whose socket reported an error
    pub exceptional: Vec<ClientId>,
}

impl Client {
    /// Drain whatever the socket has into the inbound buffer
    ///
    /// Reads at most `max_bytes` per call so one chatty client cannot starve
    /// the cycle.
    pub(crate) fn read_available(&mut self, chunk: usize, max_bytes: usize) -> Result<ReadOutcome> {
        let mut buf = vec![0u8; chunk.max(1)];
        let mut outcome = ReadOutcome {
            bytes: 0,
            closed: false,
        };
        while outcome.bytes < max_bytes {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    outcome.closed = true;
                    break;
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&buf[..n]);
                    outcome.bytes += n;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == ErrorKind::ConnectionReset
                        || e.kind() == ErrorKind::ConnectionAborted
                        || e.kind() == ErrorKind::UnexpectedEof =>
                {
                    outcome.closed = true;
                    break;
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(outcome)
    }

    /// Write queued bytes until the socket would block
    fn flush(&mut self, now: Instant, limits: &RegistryLimits) -> Result<()> {
        let mut written = 0;
        while written < self.outbound.len() {
            match self.stream.write(&self.outbound[written..]) {
                Ok(0) => {
                    return Err(Error::BroadcastFailure("socket accepted 0 bytes".to_string()));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::BroadcastFailure(e.to_string())),
            }
        }
        self.outbound.drain(..written);

        if self.outbound.is_empty() {
            self.stalled_since = None;
            return Ok(());
        }
        if written > 0 {
            // Progress restarts the stall clock
            self.stalled_since = Some(now);
            return Ok(());
        }
        let since = *self.stalled_since.get_or_insert(now);
        if now.duration_since(since) >= limits.send_timeout {
            return Err(Error::BroadcastFailure(format!(
                "no progress for {:?} with {} bytes queued",
                now.duration_since(since),
                self.outbound.len()
            )));
        }
        Ok(())
    }

    /// Bytes waiting to be written
    pub fn queued_bytes(&self) -> usize {
        self.outbound.len()
    }
}

/// Live client set plus the listening socket
pub struct ConnectionRegistry {
    listener: Option<TcpListener>,
    clients: Vec<Client>,
    next_id: ClientId,
    limits: RegistryLimits,
}

impl ConnectionRegistry {
    /// Bind a non-blocking listener
    pub fn bind(bind_address: &str, limits: RegistryLimits) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        info!("TCP listener bound to {}", listener.local_addr()?);
        Ok(Self {
            listener: Some(listener),
            clients: Vec::new(),
            next_id: 1,
            limits,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.listener {
            Some(l) => Ok(l.local_addr()?),
            None => Err(Error::Other("listener closed".to_string())),
        }
    }

    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    /// Take ownership of an accepted socket
    pub fn admit(&mut self, stream: TcpStream) -> Result<ClientId> {
        stream.set_nonblocking(true)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let addr = stream.peer_addr()?;
        let id = self.next_id;
        self.next_id += 1;
        self.clients.push(Client {
            id,
            addr,
            stream,
            inbound: Vec::new(),
            partial_since: None,
            outbound: Vec::new(),
            stalled_since: None,
        });
        info!("Client {} connected from {} ({} total)", id, addr, self.clients.len());
        Ok(id)
    }

    /// Close and forget a client; returns false if it was already gone
    pub fn remove(&mut self, id: ClientId, reason: &Error) -> bool {
        let Some(pos) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };
        let client = self.clients.remove(pos);
        let _ = client.stream.shutdown(Shutdown::Both);
        match reason {
            Error::ClientDisconnected => info!("Client {} ({}) disconnected", id, client.addr),
            other => warn!("Dropping client {} ({}): {}", id, client.addr, other),
        }
        true
    }

    /// Accept pending connections and report which clients need service
    pub fn poll_readable(&mut self) -> PollEvents {
        let mut events = PollEvents::default();

        loop {
            let accepted = match &self.listener {
                Some(listener) => listener.accept(),
                None => break,
            };
            match accepted {
                Ok((stream, addr)) => match self.admit(stream) {
                    Ok(id) => events.admitted.push(id),
                    Err(e) => warn!("Failed to admit client {}: {}", addr, e),
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error accepting client connection: {}", e);
                    break;
                }
            }
        }

        let mut probe = [0u8; 1];
        for client in &self.clients {
            if let Ok(Some(e)) = client.stream.take_error() {
                debug!("Client {} socket error: {}", client.id, e);
                events.exceptional.push(client.id);
                continue;
            }
            match client.stream.peek(&mut probe) {
                // Ok(0) is EOF, left to the reader to observe
                Ok(_) => events.readable.push(client.id),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("Client {} peek failed: {}", client.id, e);
                    events.exceptional.push(client.id);
                }
            }
        }

        events
    }

    /// Queue bytes for every client in registry order and flush
    ///
    /// Returns the clients removed because they failed or stalled.
    pub fn broadcast(&mut self, bytes: &[u8]) -> Vec<ClientId> {
        let now = Instant::now();
        let limits = self.limits;
        let mut removed = Vec::new();

        self.clients.retain_mut(|client| {
            // A message larger than the cap is still accepted into an empty queue
            if !client.outbound.is_empty()
                && client.outbound.len() + bytes.len() > limits.max_pending_bytes
            {
                warn!(
                    "Dropping client {} ({}): {} bytes already queued",
                    client.id,
                    client.addr,
                    client.outbound.len()
                );
                let _ = client.stream.shutdown(Shutdown::Both);
                removed.push(client.id);
                return false;
            }
            client.outbound.extend_from_slice(bytes);
            match client.flush(now, &limits) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping client {} ({}): {}", client.id, client.addr, e);
                    let _ = client.stream.shutdown(Shutdown::Both);
                    removed.push(client.id);
                    false
                }
            }
        });

        removed
    }

    /// Push queued bytes without adding new ones; enforces the stall timeout
    pub fn flush_pending(&mut self) -> Vec<ClientId> {
        let now = Instant::now();
        let limits = self.limits;
        let mut removed = Vec::new();
        self.clients.retain_mut(|client| {
            if client.outbound.is_empty() {
                return true;
            }
            match client.flush(now, &limits) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping client {} ({}): {}", client.id, client.addr, e);
                    let _ = client.stream.shutdown(Shutdown::Both);
                    removed.push(client.id);
                    false
                }
            }
        });
        removed
    }

    pub(crate) fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    pub(crate) fn clients_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.iter_mut()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id).collect()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.iter().any(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Shut down every client socket
    pub fn close_all(&mut self) {
        for client in self.clients.drain(..) {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
    }

    /// Stop accepting connections
    pub fn close_listener(&mut self) {
        if self.listener.take().is_some() {
            info!("TCP listener closed");
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
