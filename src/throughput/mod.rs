//! Throughput measurement: counters, congestion gate, notification pump,
//! sample scheduler and rate reporter.

pub mod counters;
pub mod gate;
pub mod pump;
pub mod reporter;
pub mod sampler;
pub mod transport;

pub use counters::{CounterSample, ThroughputCounters};
pub use gate::{CongestionGate, GateState};
pub use pump::{NotificationPump, PumpState, Suspend};
pub use reporter::{LogSink, RateReport, RateReporter, RateSink};
pub use sampler::SampleScheduler;
pub use transport::{NotificationTransport, SendError};
