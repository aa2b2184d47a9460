use crate::Error;

/// Syslog facilities, as numbered by RFC 3164. Names follow the RFC's own
/// descriptions, which is why the two clock and security facilities are
/// numbered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Facility {
    Kernel = 0,
    #[default]
    UserLevel = 1,
    MailSystem = 2,
    SystemDaemon = 3,
    Security1 = 4,
    SyslogdInternal = 5,
    LinePrinter = 6,
    NetworkNews = 7,
    Uucp = 8,
    Clock1 = 9,
    Security2 = 10,
    Ftp = 11,
    Ntp = 12,
    LogAudit = 13,
    LogAlert = 14,
    Clock2 = 15,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

/// Convert an int (as used in the wire serialization) into a `Facility`
impl TryFrom<i32> for Facility {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let fac = match value {
            0 => Facility::Kernel,
            1 => Facility::UserLevel,
            2 => Facility::MailSystem,
            3 => Facility::SystemDaemon,
            4 => Facility::Security1,
            5 => Facility::SyslogdInternal,
            6 => Facility::LinePrinter,
            7 => Facility::NetworkNews,
            8 => Facility::Uucp,
            9 => Facility::Clock1,
            10 => Facility::Security2,
            11 => Facility::Ftp,
            12 => Facility::Ntp,
            13 => Facility::LogAudit,
            14 => Facility::LogAlert,
            15 => Facility::Clock2,
            16 => Facility::Local0,
            17 => Facility::Local1,
            18 => Facility::Local2,
            19 => Facility::Local3,
            20 => Facility::Local4,
            21 => Facility::Local5,
            22 => Facility::Local6,
            23 => Facility::Local7,
            _ => return Err(Error::BadFacility),
        };

        Ok(fac)
    }
}

impl Facility {
    /// Convert a syslog facility into a unique string representation.
    /// Names are the ones Linux uses.
    pub fn as_str(self) -> &'static str {
        match self {
            Facility::Kernel => "kern",
            Facility::UserLevel => "user",
            Facility::MailSystem => "mail",
            Facility::SystemDaemon => "daemon",
            Facility::Security1 => "auth",
            Facility::SyslogdInternal => "syslog",
            Facility::LinePrinter => "lpr",
            Facility::NetworkNews => "news",
            Facility::Uucp => "uucp",
            Facility::Clock1 => "cron",
            Facility::Security2 => "authpriv",
            Facility::Ftp => "ftp",
            Facility::Ntp => "ntp",
            Facility::LogAudit => "audit",
            Facility::LogAlert => "alert",
            Facility::Clock2 => "clockd",
            Facility::Local0 => "local0",
            Facility::Local1 => "local1",
            Facility::Local2 => "local2",
            Facility::Local3 => "local3",
            Facility::Local4 => "local4",
            Facility::Local5 => "local5",
            Facility::Local6 => "local6",
            Facility::Local7 => "local7",
        }
    }
}
