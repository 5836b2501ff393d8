//! Command-line tests against the built binary.

mod command_test;
