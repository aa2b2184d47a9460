//! Minimal UDP sender, mostly useful for testing a listener.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use crate::{Error, Message};

/// Default syslog port
pub const DEFAULT_PORT: u16 = 514;

pub struct Client {
    server: SocketAddr,
    socket: Option<UdpSocket>,
}

impl Client {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            socket: None,
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Bind an ephemeral local port and associate it with the server.
    /// Does nothing when already connected.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.socket.is_some() {
            return Ok(());
        }

        let local = match self.server {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(self.server)?;

        self.socket = Some(socket);
        Ok(())
    }

    pub fn send(&self, message: &Message) -> Result<(), Error> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;
        socket.send(message.to_wire().as_bytes())?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn send_requires_connect() {
        let client = Client::new(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)));
        let msg = Message::new("localhost", "hello").unwrap();

        assert!(!client.is_connected());
        assert!(matches!(client.send(&msg), Err(Error::NotConnected)));
    }

    #[test]
    fn send() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut client = Client::new(server.local_addr().unwrap());
        client.connect().unwrap();
        client.connect().unwrap();
        assert!(client.is_connected());

        let msg = Message::new("localhost", "hello").unwrap();
        client.send(&msg).unwrap();

        let mut buf = [0u8; 2048];
        let size = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..size], msg.to_wire().as_bytes());

        client.close();
        assert!(!client.is_connected());
    }
}
