//! Worker module tests.

mod process_test;
mod supervised_test;
