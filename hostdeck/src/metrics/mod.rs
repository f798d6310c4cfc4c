//! Per-server metric sampling.
//!
//! The collector owns one periodic task per running server. Each tick
//! produces a synthetic utilization sample, stores it, publishes it on the
//! server's topic and trims the server's history to the retention cap.

mod collector;
mod generator;

pub use collector::MetricsCollector;
pub use generator::SampleGenerator;
