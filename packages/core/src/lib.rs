// Library root. Exposes the pipeline for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod alerts;
pub mod checker;
pub mod config;
pub mod db;
pub mod error;
pub mod lag;
pub mod notify;

// These modules are only needed by the binary.
pub mod cli;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;
