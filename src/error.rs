use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad severity in priority")]
    BadSeverity,
    #[error("bad facility in priority")]
    BadFacility,
    #[error("unexpected eof")]
    UnexpectedEndOfInput,
    #[error("too few digits in numeric field")]
    TooFewDigits,
    #[error("too many digits in numeric field")]
    TooManyDigits,
    #[error("unexpected input, expected character {0:?}")]
    ExpectedChar(char),
    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("invalid format for hostname {0:?}")]
    InvalidHostname(String),
    #[error("message text contains control characters")]
    InvalidText,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot send data, connection not established")]
    NotConnected,

    #[error("unable to log to database as sink is not running")]
    SinkNotRunning,
    #[error("statement has no parameter named {0:?}")]
    UnknownParameter(String),
    #[error("statement parameter {0:?} is not bound")]
    UnboundParameter(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("panicked: {0}")]
    Panicked(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a `Panicked` error out of a payload caught by `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Error::Panicked(msg)
    }
}
