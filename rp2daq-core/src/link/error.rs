use derive_more::Display;
use derive_new::new;
use thiserror::Error;

#[derive(new, Error, Debug, Display, PartialEq, Eq, Clone)]
#[display("{}", msg)]
/// An error produced by the link.
pub struct LinkError {
    #[new(into)]
    msg: String,
}

impl LinkError {
    /// Wraps an I/O error from a transport backend.
    #[must_use]
    pub fn io(err: &std::io::Error) -> Self {
        Self::new(err.to_string())
    }

    /// The error reported when an operation is attempted on a closed link.
    #[must_use]
    pub fn closed() -> Self {
        Self::new("Link is closed")
    }
}
