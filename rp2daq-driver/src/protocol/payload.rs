use itertools::Itertools;

use crate::error::DriverError;

/// Payload sample width.
///
/// Reports that stream acquisition data declare the width of their samples
/// in the header; everything else about the payload layout follows from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleWidth {
    /// One byte per sample.
    W8 = 8,
    /// Two samples nibble-packed into three bytes.
    W12 = 12,
    /// Little-endian byte pairs.
    W16 = 16,
}

impl SampleWidth {
    /// Number of wire bytes holding `count` samples.
    #[must_use]
    pub const fn packed_len(self, count: usize) -> usize {
        (count * self as usize + 7) / 8
    }
}

impl TryFrom<u8> for SampleWidth {
    type Error = DriverError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(SampleWidth::W8),
            12 => Ok(SampleWidth::W12),
            16 => Ok(SampleWidth::W16),
            other => Err(DriverError::UnsupportedBitwidth(other)),
        }
    }
}

/// Decodes `count` samples from `bytes`.
///
/// `bytes` must hold exactly [`SampleWidth::packed_len`] bytes. At width 12
/// each complete three-byte group `(b0, b1, b2)` yields the sample pair
/// `A = b0 | ((b1 & 0xF0) << 4)` and
/// `B = ((b2 & 0xF0) >> 4) | ((b1 & 0x0F) << 4) | ((b2 & 0x0F) << 8)`;
/// an odd `count` leaves a trailing two-byte group which is not decoded, and
/// the unfilled final slot repeats the last `A`. That quirk matches the
/// firmware and is pinned by tests.
#[must_use]
pub fn unpack_samples(width: SampleWidth, count: usize, bytes: &[u8]) -> Vec<u16> {
    debug_assert_eq!(width.packed_len(count), bytes.len());
    match width {
        SampleWidth::W8 => bytes.iter().map(|&b| u16::from(b)).collect(),
        SampleWidth::W16 => bytes
            .iter()
            .tuples()
            .map(|(&lo, &hi)| u16::from_le_bytes([lo, hi]))
            .collect(),
        SampleWidth::W12 => {
            let mut samples = Vec::with_capacity(count + 1);
            let mut last_a = 0;
            for (b0, b1, b2) in bytes.iter().copied().tuples() {
                let a = u16::from(b0) | (u16::from(b1 & 0xF0) << 4);
                let b = u16::from((b2 & 0xF0) >> 4)
                    | (u16::from(b1 & 0x0F) << 4)
                    | (u16::from(b2 & 0x0F) << 8);
                samples.push(a);
                samples.push(b);
                last_a = a;
            }
            samples.truncate(count);
            samples.resize(count, last_a);
            samples
        }
    }
}

/// Encodes `samples` at `width`; the inverse of [`unpack_samples`] except
/// for the odd-count quirk at width 12.
///
/// Samples must fit the width; the excess bits of an oversized sample are
/// discarded.
#[must_use]
pub fn pack_samples(width: SampleWidth, samples: &[u16]) -> Vec<u8> {
    match width {
        SampleWidth::W8 => samples.iter().map(|&s| s as u8).collect(),
        SampleWidth::W16 => samples.iter().flat_map(|&s| s.to_le_bytes()).collect(),
        SampleWidth::W12 => {
            let mut bytes = Vec::with_capacity(width.packed_len(samples.len()));
            let mut pairs = samples.chunks_exact(2);
            for pair in &mut pairs {
                let (a, b) = (pair[0], pair[1]);
                bytes.push(a as u8);
                bytes.push((((a >> 8) & 0x0F) as u8) << 4 | ((b >> 4) & 0x0F) as u8);
                bytes.push((((b & 0x0F) as u8) << 4) | ((b >> 8) & 0x0F) as u8);
            }
            if let [a] = pairs.remainder() {
                bytes.push(*a as u8);
                bytes.push((((a >> 8) & 0x0F) as u8) << 4);
            }
            bytes
        }
    }
}
