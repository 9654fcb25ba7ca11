mod error;
mod sync;

pub use error::LinkError;
pub use sync::Link;
