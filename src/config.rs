//! Daemon configuration, read from TOML.
//!
//! Every key is optional:
//!
//! ```toml
//! [listener]
//! address = "0.0.0.0"
//! port = 514
//! poll_interval_ms = 250
//! max_datagram_size = 65535
//!
//! [sink]
//! destination = "sqlite://syslog.db"
//! system = "syslogd"
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::listener::ListenerConfig;
use crate::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listener: ListenerSection,
    pub sink: SinkSection,
    pub log: LogSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerSection {
    pub address: IpAddr,
    pub port: u16,
    pub poll_interval_ms: u64,
    pub max_datagram_size: usize,
}

impl Default for ListenerSection {
    fn default() -> Self {
        let defaults = ListenerConfig::default();
        Self {
            address: defaults.address,
            port: defaults.port,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            max_datagram_size: defaults.max_datagram_size,
        }
    }
}

impl ListenerSection {
    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            address: self.address,
            port: self.port,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_datagram_size: self.max_datagram_size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkSection {
    /// Database URL
    pub destination: String,
    /// Written to the `system` column of the daemon's own log events
    pub system: String,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            destination: "sqlite://syslog.db".to_string(),
            system: "syslogd".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` wins if set
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        fs::read_to_string(path)?.parse()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.sink.destination.trim().is_empty() {
            return Err(Error::InvalidConfig("sink.destination is empty".into()));
        }
        if self.listener.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "listener.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.listener.max_datagram_size == 0 {
            return Err(Error::InvalidConfig(
                "listener.max_datagram_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
