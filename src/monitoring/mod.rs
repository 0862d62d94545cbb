//! Monitoring Module
//!
//! Reporting helpers built on execution records and agent health.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step timings and Gantt charts
//! - [`health_report`]: Agent health listing

pub mod health;
pub mod timeline;

pub use health::{health_report, HealthSummary};
pub use timeline::{ExecutionTimeline, TimelineEntry};
