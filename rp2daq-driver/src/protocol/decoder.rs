use std::collections::VecDeque;

use crate::error::DriverError;

use super::payload::{unpack_samples, SampleWidth};
use super::report::{Payload, Report};
use super::schema::{self, DATA_BITWIDTH, DATA_COUNT};

/// Decodes the next complete report from the front of `buf`.
///
/// Returns `Ok(None)` while the buffered bytes do not yet hold a complete
/// frame; nothing is consumed until the whole frame (header and payload) is
/// buffered, so a partial frame is never half-read. An unknown report type
/// or an unsupported payload bitwidth means the host schema tables disagree
/// with the firmware; both are unrecoverable for the stream, since the
/// frame boundary is lost.
pub fn decode_next(buf: &mut VecDeque<u8>) -> Result<Option<Report>, DriverError> {
    let Some(&report_type) = buf.front() else {
        return Ok(None);
    };
    let schema = schema::report_schema(report_type)
        .ok_or(DriverError::UnknownReportType(report_type))?;

    let header_len = schema.header_len();
    if buf.len() < header_len {
        return Ok(None);
    }

    let header: Vec<u8> = buf.iter().take(header_len).copied().collect();
    let mut fields = Vec::with_capacity(schema.fields.len());
    let mut offset = 0;
    for field in schema.fields {
        fields.push((field.name, field.ty.decode(&header[offset..])));
        offset += field.ty.size();
    }

    let count = fields
        .iter()
        .find(|(n, _)| *n == DATA_COUNT)
        .map_or(0, |&(_, v)| v);
    let bitwidth = fields
        .iter()
        .find(|(n, _)| *n == DATA_BITWIDTH)
        .map_or(0, |&(_, v)| v);

    let data = if count > 0 && bitwidth > 0 {
        let width = SampleWidth::try_from(bitwidth as u8)?;
        let count = count as usize;
        let payload_len = width.packed_len(count);
        if buf.len() < header_len + payload_len {
            return Ok(None);
        }
        let payload: Vec<u8> = buf
            .iter()
            .skip(header_len)
            .take(payload_len)
            .copied()
            .collect();
        buf.drain(..header_len + payload_len);
        Some(Payload {
            width,
            samples: unpack_samples(width, count, &payload),
        })
    } else {
        buf.drain(..header_len);
        None
    };

    tracing::trace!("decoded {} ({} fields)", schema.name, fields.len());
    Ok(Some(Report::new(report_type, fields, data)))
}

/// Decodes the next complete command frame from the front of `buf`.
///
/// The instrument-side counterpart of
/// [`encode_command`](super::encode_command), consumed by the in-process
/// emulator and by firmware-style tests. Same contract as [`decode_next`]:
/// nothing is consumed until the whole frame is buffered.
pub fn decode_next_command(buf: &mut VecDeque<u8>) -> Result<Option<(u8, Vec<i64>)>, DriverError> {
    let Some(&code) = buf.front() else {
        return Ok(None);
    };
    let schema = schema::command_schema(code).ok_or(DriverError::UnknownCommandCode(code))?;
    if buf.len() < schema.frame_len() {
        return Ok(None);
    }

    let frame: Vec<u8> = buf.iter().take(schema.frame_len()).copied().collect();
    let mut operands = Vec::with_capacity(schema.operands.len());
    let mut offset = 1;
    for field in schema.operands {
        operands.push(field.ty.decode(&frame[offset..]));
        offset += field.ty.size();
    }
    buf.drain(..schema.frame_len());
    Ok(Some((code, operands)))
}

#[cfg(test)]
mod tests {
    use super::super::encoder::{encode_command, encode_report};
    use super::super::schema::{cmd, report, REPORT_SCHEMAS};
    use super::*;

    fn buf(bytes: &[u8]) -> VecDeque<u8> {
        bytes.iter().copied().collect()
    }

    #[test]
    fn decode_stepper_status() -> anyhow::Result<()> {
        let mut buf = buf(&[0x03, 0x01, 0x00, 0x2A, 0x00, 0x00, 0x00]);
        let report = decode_next(&mut buf)?.expect("complete frame");
        assert_eq!(0x03, report.report_type);
        assert_eq!(Some(3), report.field("report_type"));
        assert_eq!(Some(1), report.field("active"));
        assert_eq!(Some(0), report.field("endswitch"));
        assert_eq!(Some(42), report.field("nanopos"));
        assert_eq!(None, report.data);
        assert!(buf.is_empty());
        Ok(())
    }

    #[test]
    fn incomplete_header_consumes_nothing() -> anyhow::Result<()> {
        let mut buf = buf(&[0x03, 0x01, 0x00]);
        assert_eq!(None, decode_next(&mut buf)?);
        assert_eq!(3, buf.len());
        Ok(())
    }

    #[test]
    fn incomplete_payload_consumes_nothing() -> anyhow::Result<()> {
        // stm_status announcing 4 16-bit samples, only 3 payload bytes yet
        let mut buf = buf(&[0x04, 0x04, 0x00, 0x10, 0xAA, 0xBB, 0xCC]);
        assert_eq!(None, decode_next(&mut buf)?);
        assert_eq!(7, buf.len());
        Ok(())
    }

    #[test]
    fn decode_linescan_payload() -> anyhow::Result<()> {
        let mut buf = buf(&[
            0x0A, 0x07, 0x00, 0x04, 0x00, 0x0C, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC,
        ]);
        let report = decode_next(&mut buf)?.expect("complete frame");
        assert_eq!(Some(7), report.field("line"));
        assert_eq!(Some(4), report.field(DATA_COUNT));
        assert_eq!(Some(12), report.field(DATA_BITWIDTH));
        assert_eq!(&[0x312, 0x645, 0x978, 0xCAB], report.samples());
        assert!(buf.is_empty());
        Ok(())
    }

    #[test]
    fn zero_count_means_no_payload() -> anyhow::Result<()> {
        let mut buf = buf(&[0x04, 0x00, 0x00, 0x10]);
        let report = decode_next(&mut buf)?.expect("complete frame");
        assert_eq!(None, report.data);
        assert!(buf.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_report_type_is_fatal() {
        let mut buf = buf(&[0xEE, 0x01, 0x02]);
        assert_eq!(
            Err(DriverError::UnknownReportType(0xEE)),
            decode_next(&mut buf)
        );
    }

    #[test]
    fn unsupported_bitwidth_is_fatal() {
        // stm_status announcing 24-bit samples
        let mut buf = buf(&[0x04, 0x02, 0x00, 0x18, 0xAA, 0xBB]);
        assert_eq!(
            Err(DriverError::UnsupportedBitwidth(24)),
            decode_next(&mut buf)
        );
    }

    #[test]
    fn consecutive_frames_decode_in_order() -> anyhow::Result<()> {
        let mut bytes = encode_report(report::STEPPER_STATUS, &[1, 0, -7], None)?;
        bytes.extend(encode_report(report::APPROACH_DONE, &[1, 1234], None)?);
        let mut buf: VecDeque<u8> = bytes.into_iter().collect();

        let first = decode_next(&mut buf)?.expect("first frame");
        assert_eq!(report::STEPPER_STATUS, first.report_type);
        assert_eq!(Some(-7), first.field("nanopos"));

        let second = decode_next(&mut buf)?.expect("second frame");
        assert_eq!(report::APPROACH_DONE, second.report_type);
        assert_eq!(Some(1234), second.field("zpos"));

        assert_eq!(None, decode_next(&mut buf)?);
        Ok(())
    }

    #[test]
    fn command_roundtrip() -> anyhow::Result<()> {
        let operands = [1_i64, -512 * 256, 256, 1];
        let mut bytes = encode_command(cmd::MOVE_STEPPER, &operands)?;
        bytes.extend(encode_command(cmd::GET_STM_STATUS, &[])?);
        let mut buf: VecDeque<u8> = bytes.into_iter().collect();

        assert_eq!(
            Some((cmd::MOVE_STEPPER, operands.to_vec())),
            decode_next_command(&mut buf)?
        );
        assert_eq!(
            Some((cmd::GET_STM_STATUS, Vec::new())),
            decode_next_command(&mut buf)?
        );
        assert_eq!(None, decode_next_command(&mut buf)?);
        Ok(())
    }

    #[test]
    fn partial_command_consumes_nothing() -> anyhow::Result<()> {
        let mut buf = buf(&[cmd::SET_PWM, 0x01]);
        assert_eq!(None, decode_next_command(&mut buf)?);
        assert_eq!(2, buf.len());
        Ok(())
    }

    #[test]
    fn roundtrip_every_schema() -> anyhow::Result<()> {
        use rand::Rng;

        let mut rng = rand::rng();
        for schema in REPORT_SCHEMAS {
            let values: Vec<i64> = schema.fields[1..]
                .iter()
                .filter(|f| f.name != DATA_COUNT && f.name != DATA_BITWIDTH)
                .map(|f| match f.ty {
                    crate::protocol::FieldType::U8 => rng.random_range(0..=0xFF),
                    crate::protocol::FieldType::U16 => rng.random_range(0..=0xFFFF),
                    crate::protocol::FieldType::U32 => rng.random_range(0..=i64::from(u32::MAX)),
                    crate::protocol::FieldType::I32 => {
                        rng.random_range(i64::from(i32::MIN)..=i64::from(i32::MAX))
                    }
                })
                .collect();
            let carries_payload = schema.fields.iter().any(|f| f.name == DATA_COUNT);
            let samples: Vec<u16> = (0..64).map(|_| rng.random_range(0..0x1000)).collect();
            let payload = carries_payload.then_some((SampleWidth::W12, samples.as_slice()));

            let mut buf: VecDeque<u8> =
                encode_report(schema.report_type, &values, payload)?.into_iter().collect();
            let report = decode_next(&mut buf)?.expect("complete frame");

            assert_eq!(schema.report_type, report.report_type);
            let mut values = values.iter();
            for field in &schema.fields[1..] {
                let expect = match field.name {
                    DATA_COUNT => carries_payload.then_some(64).unwrap_or(0),
                    DATA_BITWIDTH => carries_payload.then_some(12).unwrap_or(0),
                    _ => *values.next().unwrap(),
                };
                assert_eq!(Some(expect), report.field(field.name), "{}", field.name);
            }
            if carries_payload {
                assert_eq!(samples.as_slice(), report.samples());
            }
            assert!(buf.is_empty());
        }
        Ok(())
    }
}
