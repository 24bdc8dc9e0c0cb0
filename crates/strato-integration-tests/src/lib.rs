#![deny(unsafe_code)]
//! Cross-subsystem scenario tests. See `tests/`.
