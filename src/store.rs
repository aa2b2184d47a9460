//! Persisting received messages through an [`AsyncSink`].

use std::net::IpAddr;
use std::sync::Arc;

use crate::listener::Observer;
use crate::sink::{AsyncSink, Record, RecordKind, Statement, Template};
use crate::{Error, Message};

/// Tables the daemon writes to.
pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS syslog (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        received_time TEXT NOT NULL,
        address TEXT NOT NULL,
        local_time TEXT NOT NULL,
        facility INTEGER NOT NULL,
        severity INTEGER NOT NULL,
        message TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS event_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_time TEXT NOT NULL,
        system TEXT NOT NULL,
        category TEXT NOT NULL,
        message TEXT NOT NULL
    )",
];

const KIND: RecordKind = RecordKind::new("syslog");

/// One received message, as a row of the `syslog` table.
#[derive(Clone, Debug)]
pub struct SyslogRecord {
    source: IpAddr,
    message: Message,
}

impl SyslogRecord {
    pub fn new(source: IpAddr, message: Message) -> Self {
        Self { source, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl Record for SyslogRecord {
    fn kind(&self) -> RecordKind {
        KIND
    }

    fn insert_template(&self) -> Template {
        Template::new(
            "INSERT INTO syslog (received_time, address, local_time, facility, severity, message) \
             VALUES (?, ?, ?, ?, ?, ?)",
            &[
                "received_time",
                "address",
                "local_time",
                "facility",
                "severity",
                "message",
            ],
        )
    }

    fn bind(&self, statement: &mut Statement<'_>) -> Result<(), Error> {
        let message = &self.message;
        statement
            .bind("received_time", message.received_at())?
            .bind("address", self.source.to_string())?
            .bind("local_time", message.device_time())?
            .bind("facility", message.facility() as i32)?
            .bind("severity", message.severity() as i32)?
            .bind("message", message.text())?;

        Ok(())
    }
}

/// Listener observer that queues every message for storage.
pub struct StoreObserver {
    sink: Arc<AsyncSink>,
}

impl StoreObserver {
    pub fn new(sink: Arc<AsyncSink>) -> Self {
        Self { sink }
    }
}

impl Observer for StoreObserver {
    fn on_message(&self, source: IpAddr, message: &Message) -> Result<(), Error> {
        self.sink
            .enqueue(SyslogRecord::new(source, message.clone()), true)
    }
}
