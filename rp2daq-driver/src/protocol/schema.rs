//! Static schema tables describing the wire protocol.
//!
//! These tables are the single source of truth for frame layouts; the
//! encoder, the decoder and the instrument emulator all consume them and
//! contain no per-command logic of their own. They mirror the protocol
//! description shipped with the firmware.

use super::field::FieldType::{self, I32, U16, U8};

/// A named wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name, unique within one schema.
    pub name: &'static str,
    /// Wire type.
    pub ty: FieldType,
}

const fn field(name: &'static str, ty: FieldType) -> Field {
    Field { name, ty }
}

/// Name of the header field carrying the payload sample count.
pub const DATA_COUNT: &str = "_data_count";
/// Name of the header field carrying the payload sample bitwidth.
pub const DATA_BITWIDTH: &str = "_data_bitwidth";

/// Static descriptor of a report type's header layout.
///
/// A report whose header carries both [`DATA_COUNT`] and [`DATA_BITWIDTH`]
/// is followed by `ceil(count * bitwidth / 8)` payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchema {
    /// The wire type byte.
    pub report_type: u8,
    /// Schema name, for logs.
    pub name: &'static str,
    /// Header fields in wire order. The first is always the type byte.
    pub fields: &'static [Field],
}

impl ReportSchema {
    /// Header length in bytes, type byte included.
    ///
    /// Exactly `header_len() - 1` bytes follow the type byte before the
    /// header is complete.
    #[must_use]
    pub fn header_len(&self) -> usize {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }
}

/// Static descriptor of a command's fixed operand layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSchema {
    /// The wire command code.
    pub code: u8,
    /// Schema name, for logs.
    pub name: &'static str,
    /// Operand fields in wire order, code byte excluded.
    pub operands: &'static [Field],
}

impl CommandSchema {
    /// Full frame length in bytes, code byte included.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        1 + self.operands.iter().map(|f| f.ty.size()).sum::<usize>()
    }
}

/// Command codes understood by the firmware.
pub mod cmd {
    /// Set a new stepper target position and speed.
    pub const MOVE_STEPPER: u8 = 1;
    /// Run the tip approach routine.
    pub const APPROACH: u8 = 2;
    /// Request a [`super::report::STEPPER_STATUS`] report.
    pub const GET_STEPPER_STATUS: u8 = 3;
    /// Request a [`super::report::STM_STATUS`] report.
    pub const GET_STM_STATUS: u8 = 4;
    /// Assign pins and inertia to a stepper channel.
    pub const INIT_STEPPER: u8 = 5;
    /// Set a piezo output.
    pub const SET_PIEZO: u8 = 9;
    /// Run one scanning-probe line scan.
    pub const LINESCAN: u8 = 10;
    /// Set a PWM duty value.
    pub const SET_PWM: u8 = 20;
    /// Assign a pin and base settings to a PWM channel.
    pub const INIT_PWM: u8 = 21;
    /// Request the raw identity block (handshake only, not report-framed).
    pub const IDENTIFY: u8 = 123;
}

/// Report types emitted by the firmware.
pub mod report {
    /// Tip approach finished.
    pub const APPROACH_DONE: u8 = 0x02;
    /// Stepper state snapshot.
    pub const STEPPER_STATUS: u8 = 0x03;
    /// Tip-voltage sample block.
    pub const STM_STATUS: u8 = 0x04;
    /// One line of scan samples.
    pub const LINESCAN_DATA: u8 = 0x0A;
}

/// Report header table, `report_type -> layout`.
pub const REPORT_SCHEMAS: &[ReportSchema] = &[
    ReportSchema {
        report_type: report::APPROACH_DONE,
        name: "approach_done",
        fields: &[
            field("report_type", U8),
            field("converged", U8),
            field("zpos", I32),
        ],
    },
    ReportSchema {
        report_type: report::STEPPER_STATUS,
        name: "stepper_status",
        fields: &[
            field("report_type", U8),
            field("active", U8),
            field("endswitch", U8),
            field("nanopos", I32),
        ],
    },
    ReportSchema {
        report_type: report::STM_STATUS,
        name: "stm_status",
        fields: &[
            field("report_type", U8),
            field(DATA_COUNT, U16),
            field(DATA_BITWIDTH, U8),
        ],
    },
    ReportSchema {
        report_type: report::LINESCAN_DATA,
        name: "linescan_data",
        fields: &[
            field("report_type", U8),
            field("line", U16),
            field(DATA_COUNT, U16),
            field(DATA_BITWIDTH, U8),
        ],
    },
];

/// Command operand table, `command_code -> layout`.
pub const COMMAND_SCHEMAS: &[CommandSchema] = &[
    CommandSchema {
        code: cmd::MOVE_STEPPER,
        name: "move_stepper",
        operands: &[
            field("motor_id", U8),
            field("nanopos", I32),
            field("nanospeed", I32),
            field("endstop_override", U8),
        ],
    },
    CommandSchema {
        code: cmd::APPROACH,
        name: "approach",
        operands: &[field("nanospeed", I32), field("setpoint", U16)],
    },
    CommandSchema {
        code: cmd::GET_STEPPER_STATUS,
        name: "get_stepper_status",
        operands: &[field("motor_id", U8)],
    },
    CommandSchema {
        code: cmd::GET_STM_STATUS,
        name: "get_stm_status",
        operands: &[],
    },
    CommandSchema {
        code: cmd::INIT_STEPPER,
        name: "init_stepper",
        operands: &[
            field("motor_id", U8),
            field("dir_pin", U8),
            field("step_pin", U8),
            field("endswitch_pin", U8),
            field("disable_pin", U8),
            field("motor_inertia", I32),
        ],
    },
    CommandSchema {
        code: cmd::SET_PIEZO,
        name: "set_piezo",
        operands: &[field("channel", U8), field("value", I32)],
    },
    CommandSchema {
        code: cmd::LINESCAN,
        name: "linescan",
        operands: &[
            field("line", U16),
            field("points", U16),
            field("nanospeed", I32),
        ],
    },
    CommandSchema {
        code: cmd::SET_PWM,
        name: "set_pwm",
        operands: &[field("channel", U8), field("value", I32)],
    },
    CommandSchema {
        code: cmd::INIT_PWM,
        name: "init_pwm",
        operands: &[
            field("channel", U8),
            field("pin", U8),
            field("bit_resolution", U8),
            field("freq_hz", I32),
            field("init_value", I32),
        ],
    },
    CommandSchema {
        code: cmd::IDENTIFY,
        name: "identify",
        operands: &[],
    },
];

/// Looks up the schema of a report type.
#[must_use]
pub fn report_schema(report_type: u8) -> Option<&'static ReportSchema> {
    REPORT_SCHEMAS.iter().find(|s| s.report_type == report_type)
}

/// Looks up the schema of a command code.
#[must_use]
pub fn command_schema(code: u8) -> Option<&'static CommandSchema> {
    COMMAND_SCHEMAS.iter().find(|s| s.code == code)
}
