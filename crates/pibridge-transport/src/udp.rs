use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace};

use crate::datagram::{Datagram, TransportConfig};
use crate::error::{Result, TransportError};

/// Bound UDP socket that receives inbound datagrams.
///
/// Each call to [`DatagramReceiver::recv`] waits at most
/// [`TransportConfig::receive_timeout`] for one datagram. A timeout is not
/// an error: it returns `Ok(None)` so the caller can run its idle cadence.
pub struct DatagramReceiver {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: TransportConfig,
    buf: Vec<u8>,
}

impl DatagramReceiver {
    /// Bind the receive socket with default configuration.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_config(addr, TransportConfig::default())
    }

    /// Bind the receive socket with explicit configuration.
    pub fn bind_with_config(addr: SocketAddr, config: TransportConfig) -> Result<Self> {
        let socket = if config.reuse_address {
            bind_reusable(addr)
        } else {
            UdpSocket::bind(addr)
        }
        .map_err(|source| TransportError::Bind { addr, source })?;

        socket
            .set_read_timeout(config.receive_timeout)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, max = config.max_datagram_size, "listening for datagrams");

        // One spare byte tells a full-size datagram apart from a truncated one.
        let buf = vec![0u8; config.max_datagram_size.saturating_add(1)];

        Ok(Self {
            socket,
            local_addr,
            config,
            buf,
        })
    }

    /// Wait for the next datagram.
    ///
    /// Returns `Ok(None)` when the bounded wait elapses with nothing received.
    /// Returns `Err(TransportError::DatagramTooLarge)` for a datagram larger
    /// than the configured limit; the socket stays usable.
    pub fn recv(&mut self) -> Result<Option<Datagram>> {
        let (read, source) = match self.socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                trace!("receive wait elapsed");
                return Ok(None);
            }
            Err(err) => return Err(TransportError::Receive(err)),
        };

        if read > self.config.max_datagram_size {
            debug!(%source, max = self.config.max_datagram_size, "discarding oversized datagram");
            return Err(TransportError::DatagramTooLarge {
                max: self.config.max_datagram_size,
            });
        }

        debug!(%source, size = read, "received datagram");
        Ok(Some(Datagram::new(self.buf[..read].to_vec(), source)))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Ephemeral UDP socket that sends datagrams to one fixed destination.
pub struct DatagramSender {
    socket: UdpSocket,
    destination: SocketAddr,
    max_datagram_size: usize,
}

impl DatagramSender {
    /// Bind an ephemeral local port for sending to `destination`.
    pub fn bind(destination: SocketAddr) -> Result<Self> {
        Self::bind_with_config(destination, &TransportConfig::default())
    }

    /// Bind an ephemeral local port with explicit configuration.
    pub fn bind_with_config(destination: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let local: SocketAddr = if destination.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket =
            UdpSocket::bind(local).map_err(|source| TransportError::Bind { addr: local, source })?;
        debug!(%destination, "send socket ready");
        Ok(Self {
            socket,
            destination,
            max_datagram_size: config.max_datagram_size,
        })
    }

    /// Send one datagram to the destination.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        if payload.len() > self.max_datagram_size {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_datagram_size,
            });
        }

        loop {
            match self.socket.send_to(payload, self.destination) {
                Ok(sent) => {
                    trace!(destination = %self.destination, size = sent, "sent datagram");
                    return Ok(sent);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransportError::Send {
                        destination: self.destination,
                        source,
                    })
                }
            }
        }
    }

    /// Destination address.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Local ephemeral address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }
}

impl std::fmt::Debug for DatagramReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramReceiver")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish()
    }
}

impl std::fmt::Debug for DatagramSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSender")
            .field("destination", &self.destination)
            .field("max_datagram_size", &self.max_datagram_size)
            .finish()
    }
}

/// Bind a UDP socket with `SO_REUSEADDR` set before `bind(2)`.
fn bind_reusable(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback() -> SocketAddr {
        (Ipv4Addr::LOCALHOST, 0).into()
    }

    fn short_wait() -> TransportConfig {
        TransportConfig {
            receive_timeout: Some(Duration::from_millis(50)),
            ..TransportConfig::default()
        }
    }

    #[test]
    fn send_and_receive_over_loopback() {
        let mut receiver = DatagramReceiver::bind_with_config(loopback(), short_wait()).unwrap();
        let sender = DatagramSender::bind(receiver.local_addr()).unwrap();

        sender.send(b"hello bridge").unwrap();

        let datagram = receiver.recv().unwrap().expect("datagram should arrive");
        assert_eq!(datagram.payload.as_ref(), b"hello bridge");
        assert_eq!(datagram.source.port(), sender.local_addr().unwrap().port());
    }

    #[test]
    fn recv_timeout_returns_none() {
        let mut receiver = DatagramReceiver::bind_with_config(loopback(), short_wait()).unwrap();

        let start = Instant::now();
        let result = receiver.recv().unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn oversized_datagram_is_rejected_and_socket_stays_usable() {
        let config = TransportConfig {
            max_datagram_size: 8,
            ..short_wait()
        };
        let mut receiver = DatagramReceiver::bind_with_config(loopback(), config).unwrap();
        let raw = UdpSocket::bind(loopback()).unwrap();

        raw.send_to(b"0123456789abcdef", receiver.local_addr()).unwrap();
        raw.send_to(b"short", receiver.local_addr()).unwrap();

        let err = receiver.recv().unwrap_err();
        assert!(matches!(err, TransportError::DatagramTooLarge { max: 8 }));

        let next = receiver.recv().unwrap().expect("second datagram should arrive");
        assert_eq!(next.payload.as_ref(), b"short");
    }

    #[test]
    fn datagram_exactly_at_limit_is_accepted() {
        let config = TransportConfig {
            max_datagram_size: 5,
            ..short_wait()
        };
        let mut receiver = DatagramReceiver::bind_with_config(loopback(), config).unwrap();
        let raw = UdpSocket::bind(loopback()).unwrap();
        raw.send_to(b"12345", receiver.local_addr()).unwrap();

        let datagram = receiver.recv().unwrap().unwrap();
        assert_eq!(datagram.len(), 5);
    }

    #[test]
    fn sender_rejects_payload_over_limit() {
        let config = TransportConfig {
            max_datagram_size: 4,
            ..TransportConfig::default()
        };
        let sender = DatagramSender::bind_with_config(loopback(), &config).unwrap();
        let err = sender.send(b"too long").unwrap_err();
        assert!(matches!(
            err,
            TransportError::PayloadTooLarge { size: 8, max: 4 }
        ));
    }

    #[test]
    fn bind_without_reuse_conflicts_on_taken_port() {
        let config = TransportConfig {
            reuse_address: false,
            ..short_wait()
        };
        let first = DatagramReceiver::bind_with_config(loopback(), config.clone()).unwrap();
        let result = DatagramReceiver::bind_with_config(first.local_addr(), config);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn bind_with_reuse_shares_port() {
        let first = DatagramReceiver::bind_with_config(loopback(), short_wait()).unwrap();
        let second = DatagramReceiver::bind_with_config(first.local_addr(), short_wait());
        assert!(second.is_ok());
    }

    #[test]
    fn ipv6_destination_binds_ipv6_sender() {
        let destination: SocketAddr = (Ipv6Addr::LOCALHOST, 9).into();
        if let Ok(sender) = DatagramSender::bind(destination) {
            assert!(sender.local_addr().unwrap().is_ipv6());
            assert_eq!(sender.destination(), destination);
        }
    }
}
