use serde::{Deserialize, Serialize};

/// Severity of a log record as it travels from a producer to the shared
/// file.
///
/// The discriminants double as the on-wire tag values. `Unknown` is what a
/// receiver reports for a tag it does not recognize; it never appears on
/// the wire itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Unknown = 0,
    Debug = 1,
    Warning = 2,
    Critical = 3,
    Fatal = 4,
}

impl Severity {
    /// Label written into the log file line, `HH:MM:SS| <label>| <text>`.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Debug => "Debug",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
            Severity::Fatal => "Fatal",
            Severity::Unknown => "Unknown",
        }
    }

    /// Tag carried in the first byte of an encoded record.
    pub fn wire_tag(self) -> u8 {
        self as u8
    }

    /// Decode a wire tag. Unrecognized tags map to `Unknown` rather than
    /// failing the whole record.
    pub fn from_wire(tag: u8) -> Self {
        match tag {
            1 => Severity::Debug,
            2 => Severity::Warning,
            3 => Severity::Critical,
            4 => Severity::Fatal,
            _ => Severity::Unknown,
        }
    }
}

/// One (severity, text) log entry in transit between a producer and the
/// sink. Ephemeral: it exists only until it reaches the file or is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub text: String,
}

impl LogRecord {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Notification payload delivered to in-process subscribers for every
/// dispatched record, independent of persistence or relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub severity: Severity,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_file_format() {
        assert_eq!(Severity::Debug.label(), "Debug");
        assert_eq!(Severity::Warning.label(), "Warning");
        assert_eq!(Severity::Critical.label(), "Critical");
        assert_eq!(Severity::Fatal.label(), "Fatal");
        assert_eq!(Severity::Unknown.label(), "Unknown");
    }

    #[test]
    fn wire_tags_round_trip() {
        for severity in [
            Severity::Debug,
            Severity::Warning,
            Severity::Critical,
            Severity::Fatal,
        ] {
            assert_eq!(Severity::from_wire(severity.wire_tag()), severity);
        }
    }

    #[test]
    fn unrecognized_tags_decode_to_unknown() {
        assert_eq!(Severity::from_wire(0), Severity::Unknown);
        assert_eq!(Severity::from_wire(5), Severity::Unknown);
        assert_eq!(Severity::from_wire(255), Severity::Unknown);
    }
}
