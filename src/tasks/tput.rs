//! Throughput reporting task
//!
//! Sleeps until each sample deadline and logs the rates measured in the
//! window that just ended.

use embassy_time::{Instant, Timer};

use crate::context::ThroughputContext;
use crate::throughput::{LogSink, RateReporter};

pub async fn tput_task(ctx: &'static ThroughputContext) -> ! {
    let reporter = RateReporter::new(ctx);
    let mut sink = LogSink;

    reporter
        .run(
            &mut sink,
            || Instant::now().as_millis(),
            |deadline| Timer::at(Instant::from_millis(deadline)),
        )
        .await
}
