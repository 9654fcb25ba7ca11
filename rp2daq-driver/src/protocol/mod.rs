mod decoder;
mod encoder;
mod field;
mod payload;
mod report;
pub mod schema;

pub use decoder::{decode_next, decode_next_command};
pub use encoder::{encode_command, encode_report};
pub use field::FieldType;
pub use payload::{pack_samples, unpack_samples, SampleWidth};
pub use report::{Payload, Report};
