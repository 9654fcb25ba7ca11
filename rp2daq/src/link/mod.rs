/// An in-process instrument emulator.
pub mod emulator;
