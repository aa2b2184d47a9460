//! Store the process's own `tracing` events next to the received messages.

use std::fmt::{self, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::sink::{self, AsyncSink, Record, RecordKind, Statement, Template};
use crate::Error;

const KIND: RecordKind = RecordKind::new("event_log");

/// One log event, as a row of the `event_log` table.
#[derive(Clone, Debug)]
pub struct EventRecord {
    time: DateTime<Utc>,
    system: String,
    category: String,
    message: String,
}

impl EventRecord {
    pub fn new(
        system: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            time: Utc::now(),
            system: system.into(),
            category: category.into(),
            message: message.into(),
        }
    }
}

impl Record for EventRecord {
    fn kind(&self) -> RecordKind {
        KIND
    }

    fn insert_template(&self) -> Template {
        Template::new(
            "INSERT INTO event_log (event_time, system, category, message) VALUES (?, ?, ?, ?)",
            &["event_time", "system", "category", "message"],
        )
    }

    fn bind(&self, statement: &mut Statement<'_>) -> Result<(), Error> {
        statement
            .bind("event_time", self.time)?
            .bind("system", self.system.as_str())?
            .bind("category", self.category.as_str())?
            .bind("message", self.message.as_str())?;

        Ok(())
    }
}

/// A layer that queues every event it sees as an [`EventRecord`].
///
/// Events are queued with failure reporting off. Events raised on the sink
/// worker thread, or by the sink or `sqlx` anywhere, are skipped, so
/// writing a record never queues another one.
pub struct SinkLayer {
    system: String,
    sink: Arc<AsyncSink>,
}

impl SinkLayer {
    pub fn new(system: impl Into<String>, sink: Arc<AsyncSink>) -> Self {
        Self {
            system: system.into(),
            sink,
        }
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if sink::on_worker_thread() || is_ignored_target(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = EventRecord::new(
            self.system.as_str(),
            metadata.level().to_string(),
            visitor.finish(),
        );
        // nowhere left to report this
        let _ = self.sink.enqueue(record, false);
    }
}

/// Events from the sink itself and from the database driver describe
/// writes. Storing them would mean another write.
const IGNORED_TARGETS: &[&str] = &[sink::TARGET, "sqlx"];

fn is_ignored_target(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target
            .strip_prefix(*ignored)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Collects the `message` field, followed by the other fields as
/// `name=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
            return;
        }

        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={:?}", field.name(), value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::sink::{Connection, Destination, Value};

    #[derive(Clone, Default)]
    struct Rows(Arc<Mutex<Vec<Vec<Value>>>>);

    impl Destination for Rows {
        fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
            Ok(Box::new(self.clone()))
        }
    }

    impl Connection for Rows {
        fn execute(&mut self, statement: &Statement<'_>) -> Result<u64, Error> {
            let row = statement.values()?.into_iter().cloned().collect();
            self.0.lock().push(row);
            Ok(1)
        }
    }

    #[test]
    fn events_become_records() {
        let sink = Arc::new(AsyncSink::new());
        let rows = Rows::default();
        sink.initialize(rows.clone()).unwrap();

        let subscriber =
            tracing_subscriber::registry().with(SinkLayer::new("test", Arc::clone(&sink)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(port = 514, "socket closed");
            tracing::info!("plain");
            // sink events are never stored
            tracing::info!(target: "syslogd::sink", "batch done");
        });

        sink.shut_down();

        let rows = rows.0.lock();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::Text("test".into()));
        assert_eq!(rows[0][2], Value::Text("WARN".into()));
        assert_eq!(rows[0][3], Value::Text("socket closed port=514".into()));
        assert_eq!(rows[1][3], Value::Text("plain".into()));
    }

    #[derive(Clone, Default)]
    struct Noisy(Arc<AtomicUsize>);

    impl Destination for Noisy {
        fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
            Ok(Box::new(self.clone()))
        }
    }

    impl Connection for Noisy {
        fn execute(&mut self, _statement: &Statement<'_>) -> Result<u64, Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(target: "sqlx::query", elapsed = 1.2, "slow statement");
            tracing::warn!(target: "slow_db", "still writing");
            Ok(1)
        }
    }

    #[test]
    fn writing_never_logs_into_the_sink() {
        let sink = Arc::new(AsyncSink::new());
        let executions = Noisy::default();

        let subscriber =
            tracing_subscriber::registry().with(SinkLayer::new("test", Arc::clone(&sink)));
        tracing::subscriber::with_default(subscriber, || {
            // the worker inherits this subscriber
            sink.initialize(executions.clone()).unwrap();
            tracing::info!("one event");
        });

        thread::sleep(Duration::from_millis(200));
        sink.shut_down();

        assert_eq!(executions.0.load(Ordering::SeqCst), 1);
        assert_eq!(sink.stats().enqueued, 1);
    }

    #[test]
    fn ignored_targets() {
        assert!(is_ignored_target("sqlx"));
        assert!(is_ignored_target("sqlx::query"));
        assert!(is_ignored_target("syslogd::sink"));
        assert!(is_ignored_target("syslogd::sink::sqlite"));
        assert!(!is_ignored_target("sqlxy"));
        assert!(!is_ignored_target("syslogd::listener"));
    }
}
