//! Background writer that moves records off the caller's thread.
//!
//! Producers [`enqueue`](AsyncSink::enqueue) records, which only appends
//! to an in-memory queue. A single worker thread swaps the whole queue out,
//! opens one connection to the [`Destination`] for the batch and writes
//! the records in order. Failures are logged and counted, never returned
//! to the producer.
//!
//! Every record carries a `report_failures` flag. Records that come from
//! the logging pipeline itself set it to false so that a broken
//! destination does not produce log events which are then queued for the
//! same broken destination. A batch that can't get a connection at all is
//! always reported.
//!
//! The worker runs under the subscriber that was current when the sink was
//! initialized, and marks its thread so a logging layer can tell events
//! raised while writing (by the destination, by `sqlx`) apart from the rest
//! of the process, see [`on_worker_thread`].

mod destination;
mod record;
pub mod sqlite;

use std::cell::Cell;
use std::collections::HashMap;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::dispatcher::{self, Dispatch};
use tracing::{debug, error, info, warn};

pub use destination::{Connection, Destination};
pub use record::{Record, RecordKind, Statement, Template, Value};

use crate::Error;

/// Target of the sink's own log events.
pub(crate) const TARGET: &str = module_path!();

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on a sink worker thread. Anything logged there happens while a
/// batch is being written.
pub fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

struct QueuedRecord {
    record: Box<dyn Record>,
    report_failures: bool,
}

#[derive(Default)]
struct Queue {
    running: bool,
    items: Vec<QueuedRecord>,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    counters: Counters,
}

/// Snapshot of sink activity since it was created.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records accepted by `enqueue`
    pub enqueued: u64,
    /// Records the destination accepted
    pub written: u64,
    /// Records that failed to bind, execute or panicked
    pub failed: u64,
    /// Records lost because no connection could be opened for their batch
    pub dropped: u64,
}

#[derive(Default)]
pub struct AsyncSink {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the worker thread writing to `destination`. Returns once the
    /// worker is up. Does nothing when already running, in which case
    /// `destination` is dropped.
    pub fn initialize(&self, destination: impl Destination) -> Result<(), Error> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        info!("initializing sink");

        {
            let mut queue = self.shared.queue.lock();
            queue.items.clear();
            queue.running = true;
        }

        let ready = Arc::new(Barrier::new(2));
        let runner = Worker {
            shared: Arc::clone(&self.shared),
            destination,
            templates: HashMap::new(),
        };
        let worker_ready = Arc::clone(&ready);
        let dispatch = dispatcher::get_default(Dispatch::clone);
        let handle = thread::Builder::new()
            .name("syslog-sink".to_string())
            .spawn(move || dispatcher::with_default(&dispatch, || runner.run(&worker_ready)))
            .map_err(|err| {
                self.shared.queue.lock().running = false;
                error!(?err, "could not start sink worker");
                err
            })?;

        ready.wait();
        *worker = Some(handle);

        info!("sink initialized");
        Ok(())
    }

    /// Queue `record` for writing. Never blocks on I/O.
    ///
    /// When `report_failures` is false, a failure to write this record is
    /// counted but not logged.
    pub fn enqueue(&self, record: impl Record, report_failures: bool) -> Result<(), Error> {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.running {
                return Err(Error::SinkNotRunning);
            }

            queue.items.push(QueuedRecord {
                record: Box::new(record),
                report_failures,
            });
        }

        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Stop accepting records and wait for the worker to write everything
    /// queued so far. Does nothing when not running.
    pub fn shut_down(&self) {
        // held until the worker is gone, so a concurrent initialize can't
        // start a second worker on the same queue
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        info!("shutting down sink");

        self.shared.queue.lock().running = false;
        self.shared.wake.notify_one();

        if handle.join().is_err() {
            error!("sink worker panicked");
        }

        info!("sink shut down");
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.lock().running
    }

    pub fn stats(&self) -> SinkStats {
        let counters = &self.shared.counters;
        SinkStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// State owned by the worker thread.
struct Worker<D> {
    shared: Arc<Shared>,
    destination: D,
    templates: HashMap<RecordKind, Template>,
}

impl<D: Destination> Worker<D> {
    fn run(mut self, ready: &Barrier) {
        ON_WORKER.with(|flag| flag.set(true));
        debug!("sink worker started");
        ready.wait();

        loop {
            let (batch, exiting) = {
                let mut queue = self.shared.queue.lock();
                while queue.items.is_empty() && queue.running {
                    self.shared.wake.wait(&mut queue);
                }

                (mem::take(&mut queue.items), !queue.running)
            };

            if !batch.is_empty() {
                self.write_batch(batch);
            }

            // enqueue is refused once running is false, so nothing can be
            // left behind
            if exiting {
                break;
            }
        }

        debug!("sink worker stopped");
    }

    fn write_batch(&mut self, batch: Vec<QueuedRecord>) {
        let report = batch.iter().all(|item| item.report_failures);
        let counters = &self.shared.counters;

        let mut conn = match self.destination.connect() {
            Ok(conn) => conn,
            Err(err) => {
                counters
                    .dropped
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                warn!(%err, dropped = batch.len(), "unable to connect to destination");
                return;
            }
        };

        let mut written = 0u64;
        let mut failed = 0u64;
        for item in &batch {
            let record = item.record.as_ref();
            let result = catch_unwind(AssertUnwindSafe(|| {
                write_record(&mut self.templates, conn.as_mut(), record)
            }))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

            match result {
                Ok(_) => written += 1,
                Err(err) => {
                    failed += 1;
                    if item.report_failures {
                        warn!(kind = %record.kind(), %err, "unable to write record");
                    }
                }
            }
        }

        if let Err(err) = conn.close() {
            if report {
                warn!(%err, "error closing destination connection");
            }
        }

        counters.written.fetch_add(written, Ordering::Relaxed);
        counters.failed.fetch_add(failed, Ordering::Relaxed);

        if report {
            debug!(written, failed, "batch done");
        }
    }
}

fn write_record(
    templates: &mut HashMap<RecordKind, Template>,
    conn: &mut dyn Connection,
    record: &dyn Record,
) -> Result<u64, Error> {
    let template = templates
        .entry(record.kind())
        .or_insert_with(|| record.insert_template());

    let mut statement = Statement::new(template);
    record.bind(&mut statement)?;
    conn.execute(&statement)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use super::*;

    const KIND: RecordKind = RecordKind::new("test");

    struct Number(i64);

    impl Record for Number {
        fn kind(&self) -> RecordKind {
            KIND
        }

        fn insert_template(&self) -> Template {
            Template::new("INSERT INTO numbers (n) VALUES (?)", &["n"])
        }

        fn bind(&self, statement: &mut Statement<'_>) -> Result<(), Error> {
            statement.bind("n", self.0)?;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<i64>>>);

    impl Destination for Collect {
        fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
            Ok(Box::new(self.clone()))
        }
    }

    impl Connection for Collect {
        fn execute(&mut self, statement: &Statement<'_>) -> Result<u64, Error> {
            for value in statement.values()? {
                if let Value::Integer(n) = value {
                    self.0.lock().push(*n);
                }
            }
            Ok(1)
        }
    }

    #[test]
    fn lifecycle() {
        let sink = AsyncSink::new();
        assert!(!sink.is_running());
        assert!(matches!(
            sink.enqueue(Number(1), true),
            Err(Error::SinkNotRunning)
        ));
        sink.shut_down();

        let rows = Collect::default();
        sink.initialize(rows.clone()).unwrap();
        assert!(sink.is_running());
        // second initialize keeps the first destination
        sink.initialize(Collect::default()).unwrap();

        for n in 0..100 {
            sink.enqueue(Number(n), true).unwrap();
        }
        sink.shut_down();

        assert!(!sink.is_running());
        assert_eq!(*rows.0.lock(), (0..100).collect::<Vec<_>>());
        assert_eq!(
            sink.stats(),
            SinkStats {
                enqueued: 100,
                written: 100,
                failed: 0,
                dropped: 0
            }
        );
    }

    #[test]
    fn restart() {
        let sink = AsyncSink::new();
        let rows = Collect::default();

        sink.initialize(rows.clone()).unwrap();
        sink.enqueue(Number(1), true).unwrap();
        sink.shut_down();

        sink.initialize(rows.clone()).unwrap();
        sink.enqueue(Number(2), true).unwrap();
        sink.shut_down();

        assert_eq!(*rows.0.lock(), vec![1, 2]);
    }

    #[test]
    fn template_built_once_per_kind() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        struct Counted;

        impl Record for Counted {
            fn kind(&self) -> RecordKind {
                RecordKind::new("counted")
            }

            fn insert_template(&self) -> Template {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Template::new("INSERT INTO numbers (n) VALUES (?)", &["n"])
            }

            fn bind(&self, statement: &mut Statement<'_>) -> Result<(), Error> {
                statement.bind("n", 0)?;
                Ok(())
            }
        }

        let sink = AsyncSink::new();
        sink.initialize(Collect::default()).unwrap();
        for _ in 0..20 {
            sink.enqueue(Counted, true).unwrap();
        }
        sink.shut_down();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(sink.stats().written, 20);
    }

    /// Every connect fails. The first one waits until released.
    struct Unreachable {
        gate: mpsc::Receiver<()>,
        connects: Arc<AtomicUsize>,
    }

    impl Destination for Unreachable {
        fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
            if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.gate.recv();
            }
            Err(Error::NotConnected)
        }
    }

    struct CountWarnings(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for CountWarnings {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn connect_failure_is_always_reported() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicUsize::new(0));
        let (release, gate) = mpsc::channel();

        let sink = AsyncSink::new();
        let subscriber =
            tracing_subscriber::registry().with(CountWarnings(Arc::clone(&warnings)));
        tracing::subscriber::with_default(subscriber, || {
            sink.initialize(Unreachable {
                gate,
                connects: Arc::clone(&connects),
            })
            .unwrap();
        });

        sink.enqueue(Number(0), true).unwrap();
        while connects.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        // the worker is stuck in the first connect, so these two share the
        // next batch, and one of them doesn't report its own failures
        sink.enqueue(Number(1), true).unwrap();
        sink.enqueue(Number(2), false).unwrap();
        release.send(()).unwrap();
        sink.shut_down();

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(sink.stats().dropped, 3);
        assert_eq!(warnings.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn worker_thread_is_marked() {
        #[derive(Clone, Default)]
        struct ThreadCheck(Arc<Mutex<Vec<bool>>>);

        impl Destination for ThreadCheck {
            fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
                self.0.lock().push(on_worker_thread());
                Ok(Box::new(Collect::default()))
            }
        }

        let seen = ThreadCheck::default();
        let sink = AsyncSink::new();
        sink.initialize(seen.clone()).unwrap();
        sink.enqueue(Number(1), true).unwrap();
        sink.shut_down();

        assert!(!on_worker_thread());
        assert_eq!(*seen.0.lock(), vec![true]);
    }
}
