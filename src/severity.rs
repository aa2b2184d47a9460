use crate::Error;

/// Syslog Severities from RFC 3164.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    #[default]
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

/// Convert an int (as used in the wire serialization) into a `Severity`
impl TryFrom<i32> for Severity {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        let severity = match value {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Informational,
            7 => Severity::Debug,
            _ => return Err(Error::BadSeverity),
        };

        Ok(severity)
    }
}

impl Severity {
    /// Convert a syslog severity into a unique string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emergency => "emerg",
            Severity::Alert => "alert",
            Severity::Critical => "crit",
            Severity::Error => "err",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Informational => "info",
            Severity::Debug => "debug",
        }
    }
}
