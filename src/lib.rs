//! Collector for [RFC 3164](https://tools.ietf.org/html/rfc3164) BSD syslog
//! messages sent over UDP.
//!
//! The pieces:
//!
//!  * [`rfc3164::parse_message`] decodes a datagram. It never fails, devices
//!    that don't follow the RFC still get their text recorded.
//!  * [`Listener`] owns a UDP socket and a receive thread, and hands each
//!    decoded [`Message`] to its [`Observer`]s.
//!  * [`AsyncSink`] writes records to a database on a background thread so
//!    that observers never wait for I/O.
//!  * [`store::StoreObserver`] and [`trace::SinkLayer`] connect the two, for
//!    received messages and the process's own log events respectively.
//!
//! # Example
//!
//! A simple syslog server
//!
//! ```no_run
//! use std::net::IpAddr;
//! use std::sync::Arc;
//! use syslogd::{Error, Listener, ListenerConfig, Message};
//!
//! let listener = Listener::new(ListenerConfig::new("127.0.0.1".parse().unwrap(), 10514));
//! listener.subscribe(Arc::new(|source: IpAddr, msg: &Message| -> Result<(), Error> {
//!     println!("{} {:?} {:?} {}", source, msg.facility(), msg.severity(), msg.text());
//!     Ok(())
//! }));
//! listener.connect().unwrap();
//! ```
//!
//! # Unimplemented Features
//!
//!  * RFC 5424 framing. Such messages are accepted, but end up as plain
//!    text with the default facility and severity unless their header also
//!    happens to fit the BSD shape.
//!  * Non UTF-8 payloads are decoded lossily.

pub mod client;
pub mod config;
mod error;
mod facility;
pub mod listener;
mod message;
pub mod rfc3164;
mod severity;
pub mod sink;
pub mod store;
pub mod timestamp;
pub mod trace;

pub use error::Error;
pub use facility::Facility;
pub use listener::{Listener, ListenerConfig, ListenerStats, Observer, SubscriptionId};
pub use message::{Message, MAX_PACKET_LENGTH};
pub use severity::Severity;
pub use sink::{AsyncSink, SinkStats};
