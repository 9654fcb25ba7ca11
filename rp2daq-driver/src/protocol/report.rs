use super::payload::SampleWidth;

/// Decoded payload samples of uniform bitwidth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Sample width declared by the header.
    pub width: SampleWidth,
    /// Decoded samples.
    pub samples: Vec<u16>,
}

/// A decoded device-to-host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// The wire type byte identifying the schema.
    pub report_type: u8,
    fields: Vec<(&'static str, i64)>,
    /// Payload, present iff the header declared a positive `_data_count`
    /// and `_data_bitwidth`.
    pub data: Option<Payload>,
}

impl Report {
    pub(crate) fn new(
        report_type: u8,
        fields: Vec<(&'static str, i64)>,
        data: Option<Payload>,
    ) -> Self {
        Self {
            report_type,
            fields,
            data,
        }
    }

    /// Returns the value of a named header field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<i64> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, v)| v)
    }

    /// Header fields in wire order.
    #[must_use]
    pub fn fields(&self) -> &[(&'static str, i64)] {
        &self.fields
    }

    /// Payload samples; empty when the report carries none.
    #[must_use]
    pub fn samples(&self) -> &[u16] {
        self.data.as_ref().map_or(&[], |p| p.samples.as_slice())
    }

    /// Consumes the report and returns its payload samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<u16> {
        self.data.map_or_else(Vec::new, |p| p.samples)
    }
}
