//! Protocol status codes.
//!
//! Statuses are data, never errors: a test case declares the status it
//! expects and the engine compares. Raw values travel as `i32` because a
//! non-conformant platform may answer with a value outside the taxonomy.

use std::fmt;

/// Local sentinel meaning "do not assert a specific status".
pub const STATUS_UNSPECIFIED: i32 = -100;

#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    NotSupported = -1,
    InvalidParameters = -2,
    Denied = -3,
    NotFound = -4,
    OutOfRange = -5,
    Busy = -6,
    CommsError = -7,
    GenericError = -8,
    HardwareError = -9,
    ProtocolError = -10,
}

impl Status {
    pub const ALL: [Status; 11] = [
        Status::Success,
        Status::NotSupported,
        Status::InvalidParameters,
        Status::Denied,
        Status::NotFound,
        Status::OutOfRange,
        Status::Busy,
        Status::CommsError,
        Status::GenericError,
        Status::HardwareError,
        Status::ProtocolError,
    ];

    pub fn from_i32(val: i32) -> Option<Self> {
        Some(match val {
            0 => Status::Success,
            -1 => Status::NotSupported,
            -2 => Status::InvalidParameters,
            -3 => Status::Denied,
            -4 => Status::NotFound,
            -5 => Status::OutOfRange,
            -6 => Status::Busy,
            -7 => Status::CommsError,
            -8 => Status::GenericError,
            -9 => Status::HardwareError,
            -10 => Status::ProtocolError,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::NotSupported => "NOT_SUPPORTED",
            Status::InvalidParameters => "INVALID_PARAMETERS",
            Status::Denied => "DENIED",
            Status::NotFound => "NOT_FOUND",
            Status::OutOfRange => "OUT_OF_RANGE",
            Status::Busy => "BUSY",
            Status::CommsError => "COMMS_ERROR",
            Status::GenericError => "GENERIC_ERROR",
            Status::HardwareError => "HARDWARE_ERROR",
            Status::ProtocolError => "PROTOCOL_ERROR",
        }
    }
}

impl TryFrom<i32> for Status {
    type Error = UnknownStatus;

    fn try_from(val: i32) -> Result<Self, Self::Error> {
        Status::from_i32(val).ok_or(UnknownStatus(val))
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status.as_i32()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// Human-readable name for a raw status value.
pub fn status_name(raw: i32) -> String {
    match Status::from_i32(raw) {
        Some(status) => status.to_string(),
        None if raw == STATUS_UNSPECIFIED => "UNSPECIFIED".to_string(),
        None => format!("UNKNOWN ({})", raw),
    }
}

/// Error when converting from a raw value outside the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatus(pub i32);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// The status a test case expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedStatus {
    /// The response status must equal this value.
    Exact(Status),
    /// Accept any status and report it.
    Unspecified,
}

impl ExpectedStatus {
    /// Build from a fixture value, honouring the `-100` sentinel.
    pub fn from_raw(raw: i32) -> Result<Self, UnknownStatus> {
        if raw == STATUS_UNSPECIFIED {
            return Ok(ExpectedStatus::Unspecified);
        }
        Status::try_from(raw).map(ExpectedStatus::Exact)
    }

    pub fn as_raw(self) -> i32 {
        match self {
            ExpectedStatus::Exact(status) => status.as_i32(),
            ExpectedStatus::Unspecified => STATUS_UNSPECIFIED,
        }
    }

    /// True when the observed raw status satisfies this expectation.
    pub fn accepts(self, observed: i32) -> bool {
        match self {
            ExpectedStatus::Exact(status) => status.as_i32() == observed,
            ExpectedStatus::Unspecified => true,
        }
    }
}

impl From<Status> for ExpectedStatus {
    fn from(status: Status) -> Self {
        ExpectedStatus::Exact(status)
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Exact(status) => write!(f, "{}", status),
            ExpectedStatus::Unspecified => write!(f, "UNSPECIFIED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_values_match_taxonomy() {
        let checks = [
            (Status::Success, 0),
            (Status::NotSupported, -1),
            (Status::InvalidParameters, -2),
            (Status::Denied, -3),
            (Status::NotFound, -4),
            (Status::OutOfRange, -5),
            (Status::Busy, -6),
            (Status::CommsError, -7),
            (Status::GenericError, -8),
            (Status::HardwareError, -9),
            (Status::ProtocolError, -10),
        ];
        for (status, raw) in checks {
            assert_eq!(status.as_i32(), raw);
            assert_eq!(Status::try_from(raw), Ok(status));
        }
        assert_eq!(Status::ALL.len(), checks.len());
    }

    #[test]
    fn unknown_status() {
        assert_eq!(Status::try_from(-11), Err(UnknownStatus(-11)));
        assert!(UnknownStatus(7).to_string().contains('7'));
        assert_eq!(status_name(-42), "UNKNOWN (-42)");
        assert_eq!(status_name(-4), "NOT_FOUND (-4)");
    }

    #[test]
    fn sentinel_is_not_a_status() {
        assert!(Status::from_i32(STATUS_UNSPECIFIED).is_none());
        assert_eq!(
            ExpectedStatus::from_raw(STATUS_UNSPECIFIED),
            Ok(ExpectedStatus::Unspecified)
        );
        assert_eq!(ExpectedStatus::Unspecified.as_raw(), STATUS_UNSPECIFIED);
    }

    #[test]
    fn expected_status_accepts() {
        let exact = ExpectedStatus::Exact(Status::Success);
        assert!(exact.accepts(0));
        assert!(!exact.accepts(Status::NotFound.as_i32()));

        for raw in [-100, -10, -4, 0, 17] {
            assert!(ExpectedStatus::Unspecified.accepts(raw));
        }
    }
}
