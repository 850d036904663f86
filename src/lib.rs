// Library exports for logstreamer
// This allows the test suite to import modules

pub mod ansi;
pub mod cli;
pub mod config;
pub mod date_range;
pub mod error;
pub mod instances;
pub mod log;
pub mod stream;
pub mod transport;
pub mod viewer;
