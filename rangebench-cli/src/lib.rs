//! The `rangebench` command line tool.
//!
//! This builds on top of [`rangebench_core`] and provides the concrete collaborators of a
//! benchmark session: an S3 storage client, host discovery through EC2 instance metadata, CSV
//! result files, a `sysinfo` resource monitor, and console tables. Configuration is loaded from
//! YAML and environment variables, see [`config`].

pub mod cli;
pub mod config;
pub mod monitor;
pub mod observability;
pub mod report;
pub mod s3;
pub mod session;
pub mod sink;
pub mod topology;
