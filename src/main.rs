use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use syslogd::config::Config;
use syslogd::sink::sqlite::SqliteDestination;
use syslogd::store::{StoreObserver, SCHEMA};
use syslogd::trace::SinkLayer;
use syslogd::{AsyncSink, Listener};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            Config::from_file(&path).with_context(|| format!("loading config {path}"))?
        }
        None => Config::default(),
    };

    let sink = Arc::new(AsyncSink::new());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("parsing log level")?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .with(SinkLayer::new(&config.sink.system, Arc::clone(&sink)).with_filter(LevelFilter::INFO))
        .init();

    let destination =
        SqliteDestination::new(&config.sink.destination)?.with_bootstrap(SCHEMA.iter().copied());
    sink.initialize(destination)?;

    let listener = Listener::new(config.listener.to_listener_config());
    listener.subscribe(Arc::new(StoreObserver::new(Arc::clone(&sink))));
    if let Err(err) = listener.connect() {
        sink.shut_down();
        return Err(err).context("binding syslog socket");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for ctrl-c")?;

    info!("shutting down");
    listener.close();
    sink.shut_down();

    Ok(())
}
