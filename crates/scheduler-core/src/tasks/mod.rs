//! Demo task bodies used by `scheduler-cli` and the test suite. Not part of
//! the CORE's public contract — a real deployment supplies its own.
pub mod builtin;
