//! Table-driven frame encoders.
//!
//! One generic routine per direction; all layout knowledge stays in
//! [`schema`]. The command encoder is the host's outgoing path, the report
//! encoder exists for the instrument side (the emulator and synthetic test
//! frames).

use crate::error::DriverError;

use super::payload::{pack_samples, SampleWidth};
use super::schema::{self, DATA_BITWIDTH, DATA_COUNT};

/// Encodes a command frame: `[code:1][operands]`.
///
/// Operands are given in schema order and are range-checked against their
/// wire fields.
pub fn encode_command(code: u8, operands: &[i64]) -> Result<Vec<u8>, DriverError> {
    let schema = schema::command_schema(code).ok_or(DriverError::UnknownCommandCode(code))?;
    if operands.len() != schema.operands.len() {
        return Err(DriverError::CommandOperandCount {
            code,
            expected: schema.operands.len(),
            actual: operands.len(),
        });
    }

    let mut frame = Vec::with_capacity(schema.frame_len());
    frame.push(code);
    for (field, &value) in schema.operands.iter().zip(operands) {
        if !field.ty.fits(value) {
            return Err(DriverError::ValueOutOfRange {
                name: field.name,
                value,
                ty: field.ty,
            });
        }
        field.ty.encode(value, &mut frame);
    }
    Ok(frame)
}

/// Encodes a report frame: `[report_type:1][header fields][payload]`.
///
/// `values` covers the header fields in schema order, excluding the type
/// byte and the payload bookkeeping fields ([`DATA_COUNT`],
/// [`DATA_BITWIDTH`]), which are filled in from `payload`.
pub fn encode_report(
    report_type: u8,
    values: &[i64],
    payload: Option<(SampleWidth, &[u16])>,
) -> Result<Vec<u8>, DriverError> {
    let schema =
        schema::report_schema(report_type).ok_or(DriverError::UnknownReportType(report_type))?;

    let expected = schema.fields[1..]
        .iter()
        .filter(|f| f.name != DATA_COUNT && f.name != DATA_BITWIDTH)
        .count();
    if values.len() != expected {
        return Err(DriverError::ReportValueCount {
            report_type,
            expected,
            actual: values.len(),
        });
    }

    let (count, width) = match payload {
        Some((width, samples)) => (samples.len() as i64, width as u8 as i64),
        None => (0, 0),
    };

    let mut frame = Vec::with_capacity(schema.header_len());
    frame.push(report_type);
    let mut values = values.iter();
    for field in &schema.fields[1..] {
        let value = match field.name {
            DATA_COUNT => count,
            DATA_BITWIDTH => width,
            _ => *values.next().unwrap_or(&0),
        };
        if !field.ty.fits(value) {
            return Err(DriverError::ValueOutOfRange {
                name: field.name,
                value,
                ty: field.ty,
            });
        }
        field.ty.encode(value, &mut frame);
    }
    if let Some((width, samples)) = payload {
        frame.extend(pack_samples(width, samples));
    }
    Ok(frame)
}
