//! UDP listener that decodes syslog datagrams and hands them to observers.
//!
//! Each connected [`Listener`] owns one receive thread. Datagrams are
//! processed strictly one after the other: a datagram is decoded and every
//! observer has returned before the next datagram is read. Observers run on
//! the receive thread, so a slow observer delays everything behind it. An
//! observer that needs to do real work should hand the message off, the way
//! [`StoreObserver`](crate::store::StoreObserver) does with the sink.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::rfc3164::parse_message;
use crate::{Error, Message};

/// Default syslog port (privileged - may need root)
pub const DEFAULT_PORT: u16 = 514;

/// How long a receive blocks before the shutdown flag is looked at again.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Largest possible UDP payload.
const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65535;

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Bind address, all interfaces by default
    pub address: IpAddr,

    /// Listen port
    pub port: u16,

    /// Upper bound on how long `close` waits for a blocked receive
    pub poll_interval: Duration,

    /// Receive buffer size, longer datagrams are truncated
    pub max_datagram_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl ListenerConfig {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            ..Default::default()
        }
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Receives every decoded message.
pub trait Observer: Send + Sync {
    /// Called on the receive thread, once per datagram. Errors are logged
    /// by the listener and otherwise ignored.
    fn on_message(&self, source: IpAddr, message: &Message) -> Result<(), Error>;
}

impl<F> Observer for F
where
    F: Fn(IpAddr, &Message) -> Result<(), Error> + Send + Sync,
{
    fn on_message(&self, source: IpAddr, message: &Message) -> Result<(), Error> {
        self(source, message)
    }
}

/// Handle returned by [`Listener::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn Observer>)>,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of listener activity since it was created.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Datagrams received and dispatched
    pub datagrams: u64,
    /// Observer calls that returned an error or panicked
    pub failures: u64,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Receives, decodes and dispatches syslog messages to anyone who cares.
pub struct Listener {
    config: ListenerConfig,
    observers: Arc<RwLock<Observers>>,
    counters: Arc<Counters>,
    running: Mutex<Option<Running>>,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(ListenerConfig::default())
    }
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            observers: Arc::new(RwLock::new(Observers::default())),
            counters: Arc::new(Counters::default()),
            running: Mutex::new(None),
        }
    }

    /// Bind the socket and start the receive thread. Does nothing when
    /// already connected.
    pub fn connect(&self) -> Result<(), Error> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let bind_address = self.config.bind_address();
        let socket = UdpSocket::bind(bind_address)
            .and_then(|socket| {
                socket.set_read_timeout(Some(self.config.poll_interval))?;
                Ok(socket)
            })
            .map_err(|err| {
                error!(%bind_address, ?err, "could not listen for messages");
                err
            })?;
        let local_addr = socket.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let receiver = Receiver {
            socket,
            shutdown: Arc::clone(&shutdown),
            observers: Arc::clone(&self.observers),
            counters: Arc::clone(&self.counters),
            buf: vec![0u8; self.config.max_datagram_size],
        };

        // the socket moves into the thread, so a spawn failure drops it
        let handle = thread::Builder::new()
            .name(format!("syslog-udp-{}", local_addr.port()))
            .spawn(move || receiver.run())?;

        info!(%local_addr, "started collecting messages");

        *running = Some(Running {
            local_addr,
            shutdown,
            handle,
        });

        Ok(())
    }

    /// Stop the receive thread and release the socket. Once this returns
    /// no observer is called anymore. Does nothing when not connected.
    pub fn close(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.shutdown.store(true, Ordering::Release);
        if running.handle.join().is_err() {
            error!(local_addr = %running.local_addr, "receive thread panicked");
        }

        info!(local_addr = %running.local_addr, "stopped collecting messages");
    }

    pub fn is_connected(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The address actually bound, while connected. Useful when listening
    /// on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionId {
        let mut observers = self.observers.write();
        let id = SubscriptionId(observers.next_id);
        observers.next_id += 1;
        observers.entries.push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.entries.len();
        observers.entries.retain(|(entry, _)| *entry != id);
        observers.entries.len() != before
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            datagrams: self.counters.datagrams.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the receive thread.
struct Receiver {
    socket: UdpSocket,
    shutdown: Arc<AtomicBool>,
    observers: Arc<RwLock<Observers>>,
    counters: Arc<Counters>,
    buf: Vec<u8>,
}

impl Receiver {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut self.buf) {
                Ok((size, remote)) => self.dispatch(size, remote.ip()),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => {
                    error!(?err, "error receiving syslog message");
                }
            }
        }

        debug!("message collection thread shutting down");
    }

    fn dispatch(&self, size: usize, source: IpAddr) {
        self.counters.datagrams.fetch_add(1, Ordering::Relaxed);

        let text = String::from_utf8_lossy(&self.buf[..size]);
        let message = parse_message(source, &text);

        // observers may (un)subscribe from inside the callback, so don't
        // hold the lock while calling them
        let observers: Vec<Arc<dyn Observer>> = self
            .observers
            .read()
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_message(source, &message)))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

            if let Err(err) = result {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(%source, %err, "error dispatching syslog message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn noop(_: IpAddr, _: &Message) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let listener = Listener::default();
        let a = listener.subscribe(Arc::new(noop));
        let b = listener.subscribe(Arc::new(noop));
        assert_ne!(a, b);

        assert!(listener.unsubscribe(a));
        assert!(!listener.unsubscribe(a));
        assert_eq!(listener.observers.read().entries.len(), 1);
    }

    #[test]
    fn close_when_idle() {
        let listener = Listener::default();
        assert!(!listener.is_connected());
        listener.close();
        assert!(!listener.is_connected());
        assert_eq!(listener.local_addr(), None);
    }

    #[test]
    fn connect_twice_is_noop() {
        let listener = Listener::new(ListenerConfig::new(Ipv4Addr::LOCALHOST.into(), 0));
        listener.connect().unwrap();
        let addr = listener.local_addr().unwrap();

        listener.connect().unwrap();
        assert_eq!(listener.local_addr(), Some(addr));

        listener.close();
        assert!(!listener.is_connected());
    }

    #[test]
    fn dispatch_survives_failing_observers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = Listener::default();

        listener.subscribe(Arc::new(
            |_: IpAddr, _: &Message| -> Result<(), Error> { Err(Error::SinkNotRunning) },
        ));
        listener.subscribe(Arc::new(|_: IpAddr, _: &Message| -> Result<(), Error> {
            panic!("observer blew up")
        }));
        let counter = Arc::clone(&calls);
        listener.subscribe(Arc::new(move |_: IpAddr, _: &Message| -> Result<(), Error> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let mut receiver = Receiver {
            socket: UdpSocket::bind("127.0.0.1:0").unwrap(),
            shutdown: Arc::new(AtomicBool::new(false)),
            observers: Arc::clone(&listener.observers),
            counters: Arc::clone(&listener.counters),
            buf: vec![0u8; 64],
        };
        receiver.buf[..5].copy_from_slice(b"<1>hi");

        receiver.dispatch(5, Ipv4Addr::LOCALHOST.into());
        receiver.dispatch(5, Ipv4Addr::LOCALHOST.into());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            listener.stats(),
            ListenerStats {
                datagrams: 2,
                failures: 4
            }
        );
    }
}
