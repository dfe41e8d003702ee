//! sshfan - run a batch of shell commands across many hosts over SSH
//!
//! One worker per host runs the command list in order on a single
//! connection; the aggregator merges every worker's results into one
//! stream on stdout.

pub mod aggregator;
pub mod cli;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod executors;
pub mod logging;
pub mod models;
pub mod parser;
pub mod worker;
