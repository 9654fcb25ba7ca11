use std::time::Duration;

use rp2daq_core::link::LinkError;
use thiserror::Error;

use crate::protocol::FieldType;

/// A interface for error handling in rp2daq-driver.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum DriverError {
    /// No schema is registered for a received report type.
    ///
    /// Occurs when the host schema tables are not compatible with the
    /// firmware.
    #[error("Unknown report type: {0:#04X}")]
    UnknownReportType(u8),
    /// A report header declared a payload bitwidth other than 8, 12 or 16.
    #[error("Unsupported payload bitwidth: {0}")]
    UnsupportedBitwidth(u8),

    /// No schema is registered for a command code.
    #[error("Unknown command code: {0:#04X}")]
    UnknownCommandCode(u8),
    /// Wrong operand count for a command.
    #[error("Command {code:#04X} takes {expected} operands, but {actual} were supplied")]
    CommandOperandCount {
        /// The command code.
        code: u8,
        /// Operand count of the schema.
        expected: usize,
        /// Operand count actually supplied.
        actual: usize,
    },
    /// Wrong header value count when encoding a report.
    #[error("Report {report_type:#04X} takes {expected} header values, but {actual} were supplied")]
    ReportValueCount {
        /// The report type.
        report_type: u8,
        /// Value count of the schema, payload bookkeeping fields excluded.
        expected: usize,
        /// Value count actually supplied.
        actual: usize,
    },
    /// A value does not fit its wire field.
    #[error("{name} ({value}) does not fit a {ty:?} field")]
    ValueOutOfRange {
        /// Field name from the schema.
        name: &'static str,
        /// The offending value.
        value: i64,
        /// The wire type it must fit.
        ty: FieldType,
    },

    /// An identity block did not begin with the expected tag.
    #[error("Identity block does not begin with the \"rp2daq\" tag")]
    InvalidIdentityTag,
    /// An identity block shorter than the fixed layout.
    #[error("Identity block is truncated ({0} bytes)")]
    IdentityTooShort(usize),

    /// Error in the link.
    #[error("{0}")]
    Link(#[from] LinkError),
    /// Link is closed.
    #[error("Link is closed")]
    LinkClosed,
    /// The background engine has stopped.
    #[error("Engine has stopped")]
    EngineStopped,
    /// The expected report did not arrive in time.
    #[error("No {0:#04X} report arrived within {1:?}")]
    ResponseTimeout(u8, Duration),
    /// Another synchronous wait is outstanding for the same report type.
    #[error("A synchronous wait for report type {0:#04X} is already outstanding")]
    SyncWaitInProgress(u8),
}
