//! Tables, JSON and terminal output of a finished run.
pub mod output;
