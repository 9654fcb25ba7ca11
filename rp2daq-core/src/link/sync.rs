use super::error::LinkError;

/// A trait that provides the byte-stream interface with the instrument.
///
/// The wire protocol above this trait is self-delimiting, so a link only
/// moves raw bytes; it never inspects frame boundaries.
pub trait Link: Send {
    /// Opens the link.
    fn open(&mut self) -> Result<(), LinkError>;

    /// Closes the link.
    fn close(&mut self) -> Result<(), LinkError>;

    /// Returns the number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> Result<usize, LinkError>;

    /// Reads exactly `buf.len()` bytes from the instrument.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError>;

    /// Writes all of `bytes` to the instrument.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Checks if the link is open.
    #[must_use]
    fn is_open(&self) -> bool;
}

impl Link for Box<dyn Link> {
    fn open(&mut self) -> Result<(), LinkError> {
        self.as_mut().open()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.as_mut().close()
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        self.as_mut().bytes_to_read()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.as_mut().read_exact(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.as_mut().write_all(bytes)
    }

    fn is_open(&self) -> bool {
        self.as_ref().is_open()
    }
}
