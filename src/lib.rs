//! GPU usage dashboard: collects NVIDIA device telemetry, attributes compute
//! processes to their owning users, and renders the result.
//!
//! The collection core is [`poll::Collector::poll_once`]; everything it needs
//! from the outside world goes through [`query::DeviceQuery`],
//! [`attribution::ProcessTable`] and [`command::CommandRunner`].

pub mod aggregate;
pub mod app;
pub mod attribution;
pub mod command;
pub mod config;
pub mod data;
pub mod logging;
pub mod nvml;
pub mod poll;
pub mod query;
pub mod render;
pub mod resolver;
