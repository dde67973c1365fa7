//! Plain UDP adapter for the [`Transport`] seam.
//!
//! Every datagram starts with one control byte. Connect and disconnect frames
//! carry a little-endian u32 (protocol version or reason code); data frames
//! carry one game packet. There is no retransmission: [`Delivery`] is
//! accepted for interface compatibility but every send is best effort.

use crate::error::ServerError;
use crate::transport::{Delivery, PeerId, Transport, TransportEvent};
use log::{debug, info, warn};
use shared::types::DisconnectReason;
use shared::WireEnum;
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

const FRAME_CONNECT: u8 = 1;
const FRAME_DATA: u8 = 2;
const FRAME_DISCONNECT: u8 = 3;
const MAX_DATAGRAM: usize = 16 * 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Connect { version: u32 },
    Data(&'a [u8]),
    Disconnect { reason: u32 },
}

impl<'a> Frame<'a> {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.clear();
        match self {
            Frame::Connect { version } => {
                out.push(FRAME_CONNECT);
                out.extend_from_slice(&version.to_le_bytes());
            }
            Frame::Data(data) => {
                out.push(FRAME_DATA);
                out.extend_from_slice(data);
            }
            Frame::Disconnect { reason } => {
                out.push(FRAME_DISCONNECT);
                out.extend_from_slice(&reason.to_le_bytes());
            }
        }
    }

    pub fn decode(bytes: &'a [u8]) -> Option<Frame<'a>> {
        let (&kind, rest) = bytes.split_first()?;
        let word = || -> Option<u32> {
            let raw: [u8; 4] = rest.get(..4)?.try_into().ok()?;
            Some(u32::from_le_bytes(raw))
        };
        match kind {
            FRAME_CONNECT => Some(Frame::Connect { version: word()? }),
            FRAME_DATA if !rest.is_empty() => Some(Frame::Data(rest)),
            FRAME_DISCONNECT => Some(Frame::Disconnect { reason: word()? }),
            _ => None,
        }
    }
}

struct PeerEntry {
    id: PeerId,
    last_seen: Instant,
}

pub struct UdpTransport {
    socket: UdpSocket,
    peers: HashMap<SocketAddr, PeerEntry>,
    addrs: HashMap<PeerId, SocketAddr>,
    next_peer: u64,
    pending: VecDeque<TransportEvent>,
    timeout: Duration,
    last_sweep: Instant,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
}

impl UdpTransport {
    pub async fn bind(addr: &str, timeout: Duration) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peers: HashMap::new(),
            addrs: HashMap::new(),
            next_peer: 1,
            pending: VecDeque::new(),
            timeout,
            last_sweep: Instant::now(),
            recv_buf: vec![0; MAX_DATAGRAM],
            send_buf: Vec::with_capacity(MAX_DATAGRAM),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Resolves once a datagram is waiting.
    pub async fn readable(&self) -> std::io::Result<()> {
        self.socket.readable().await
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn handle_datagram(&mut self, len: usize, addr: SocketAddr) -> Option<TransportEvent> {
        let frame = match Frame::decode(&self.recv_buf[..len]) {
            Some(frame) => frame,
            None => {
                debug!("Dropping malformed datagram from {}", addr);
                return None;
            }
        };

        match frame {
            Frame::Connect { version } => {
                if self.peers.contains_key(&addr) {
                    debug!("Duplicate connect from {}", addr);
                    return None;
                }
                let id = PeerId(self.next_peer);
                self.next_peer += 1;
                self.peers.insert(
                    addr,
                    PeerEntry {
                        id,
                        last_seen: Instant::now(),
                    },
                );
                self.addrs.insert(id, addr);
                info!("{} connected from {}", id, addr);
                Some(TransportEvent::Connect { peer: id, version })
            }
            Frame::Data(data) => {
                let entry = self.peers.get_mut(&addr)?;
                entry.last_seen = Instant::now();
                Some(TransportEvent::Receive {
                    peer: entry.id,
                    data: data.to_vec(),
                })
            }
            Frame::Disconnect { .. } => {
                let entry = self.peers.remove(&addr)?;
                self.addrs.remove(&entry.id);
                info!("{} disconnected", entry.id);
                Some(TransportEvent::Disconnect { peer: entry.id })
            }
        }
    }

    fn sweep_timeouts(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();

        let timeout = self.timeout;
        let expired: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > timeout)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in expired {
            if let Some(entry) = self.peers.remove(&addr) {
                self.addrs.remove(&entry.id);
                info!("{} at {} timed out", entry.id, addr);
                self.pending
                    .push_back(TransportEvent::Disconnect { peer: entry.id });
            }
        }
    }

    fn send_frame(&mut self, addr: SocketAddr, frame: Frame<'_>) {
        frame.encode(&mut self.send_buf);
        if let Err(e) = self.socket.try_send_to(&self.send_buf, addr) {
            warn!("Failed to send to {}: {}", addr, e);
        }
    }
}

impl Transport for UdpTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        loop {
            match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok((len, addr)) => {
                    if let Some(event) = self.handle_datagram(len, addr) {
                        return Some(event);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error receiving datagram: {}", e);
                    break;
                }
            }
        }

        self.sweep_timeouts();
        self.pending.pop_front()
    }

    fn send(&mut self, peer: PeerId, data: &[u8], _delivery: Delivery) {
        match self.addrs.get(&peer) {
            Some(&addr) => self.send_frame(addr, Frame::Data(data)),
            None => debug!("Send to unknown {}", peer),
        }
    }

    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        if let Some(addr) = self.addrs.remove(&peer) {
            self.peers.remove(&addr);
            self.send_frame(
                addr,
                Frame::Disconnect {
                    reason: reason.to_byte() as u32,
                },
            );
            info!("Disconnected {} ({:?})", peer, reason);
        }
    }
}
