//! Control-message handling for connected clients
//!
//! Each client owns an inbound buffer. On every poll the handler appends
//! what the socket has, decodes as many complete messages as the buffer
//! holds and applies them to the shared runtime configuration.
//!
//! # Client lifecycle
//!
//! ```text
//!            bytes           complete msg
//!  Reading ─────────▶ Decoding ──────────▶ apply() ──┐
//!     ▲                  │ need more                  │
//!     └──────────────────┴────────────────────────────┘
//!
//!  EOF / reset                      ──▶ removed (ClientDisconnected)
//!  unknown tag / bad value          ──▶ removed (MalformedMessage)
//!  outbound-only tag (1-3)          ──▶ removed (MalformedMessage)
//!  partial message > timeout        ──▶ removed (MalformedMessage)
//! ```
//!
//! Messages decoded before an EOF in the same read are still applied.

use crate::core::runtime::SharedConfig;
use crate::error::{Error, Result};
use crate::streaming::registry::{ClientId, ConnectionRegistry};
use crate::streaming::wire::Codec;
use log::debug;
use std::time::{Duration, Instant};

/// Upper bound on bytes taken from one client per poll
const MAX_READ_PER_POLL: usize = 64 * 1024;

/// Outcome of servicing readable clients
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ControlReport {
    /// Control messages applied
    pub applied: usize,
    /// Clients removed, for any reason
    pub removed: Vec<ClientId>,
}

/// Decodes client input and applies it to [`SharedConfig`]
pub struct ControlHandler {
    codec: Codec,
    config: SharedConfig,
    partial_timeout: Duration,
}

impl ControlHandler {
    pub fn new(codec: Codec, config: SharedConfig, partial_timeout: Duration) -> Self {
        Self {
            codec,
            config,
            partial_timeout,
        }
    }

    /// Read and apply input from one client
    ///
    /// Returns the number of messages applied. An error means the client
    /// must be removed.
    pub fn service(&self, registry: &mut ConnectionRegistry, id: ClientId) -> Result<usize> {
        let chunk = registry.limits().read_chunk_bytes;
        let Some(client) = registry.client_mut(id) else {
            return Ok(0);
        };

        let outcome = client.read_available(chunk, MAX_READ_PER_POLL)?;
        let mut applied = 0;
        let mut offset = 0;

        let decoded = loop {
            match self.codec.decode_control(&client.inbound[offset..]) {
                Ok(Some((message, used))) => {
                    offset += used;
                    if self.config.apply(&message) {
                        debug!("Client {} applied {:?}", id, message);
                    } else {
                        debug!("Client {} sent {:?} (no change)", id, message);
                    }
                    applied += 1;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        client.inbound.drain(..offset);
        decoded?;

        if outcome.closed {
            return Err(Error::ClientDisconnected);
        }

        if client.inbound.is_empty() {
            client.partial_since = None;
        } else if offset > 0 || client.partial_since.is_none() {
            client.partial_since = Some(Instant::now());
        }
        Ok(applied)
    }

    /// Service every readable client, removing those that fail
    pub fn service_readable(
        &self,
        registry: &mut ConnectionRegistry,
        readable: &[ClientId],
    ) -> ControlReport {
        let mut report = ControlReport::default();
        for &id in readable {
            match self.service(registry, id) {
                Ok(n) => report.applied += n,
                Err(e) => {
                    if registry.remove(id, &e) {
                        report.removed.push(id);
                    }
                }
            }
        }
        report
    }

    /// Remove clients holding an incomplete message for too long
    pub fn expire_partials(&self, registry: &mut ConnectionRegistry) -> Vec<ClientId> {
        let now = Instant::now();
        let expired: Vec<(ClientId, usize)> = registry
            .clients_mut()
            .filter_map(|c| match c.partial_since {
                Some(since) if now.duration_since(since) >= self.partial_timeout => {
                    Some((c.id, c.inbound.len()))
                }
                _ => None,
            })
            .collect();

        expired
            .into_iter()
            .filter(|(id, pending)| {
                let reason = Error::MalformedMessage(format!(
                    "incomplete message ({} bytes) for over {:?}",
                    pending, self.partial_timeout
                ));
                registry.remove(*id, &reason)
            })
            .map(|(id, _)| id)
            .collect()
    }
}
