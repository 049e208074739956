//! Rate reporter
//!
//! Drains both byte counters at each sample tick and converts them to
//! kilobits per second over the window: `bytes * 8 / window_ms`.
//! A direction with no traffic in the window produces no report rather
//! than a zero.

use crate::context::ThroughputContext;

/// Rates for one sampling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateReport {
    /// Notification throughput, present only if notifications are enabled
    pub outbound_kbps: Option<u32>,
    /// Write throughput
    pub inbound_kbps: Option<u32>,
}

impl RateReport {
    pub fn is_empty(&self) -> bool {
        self.outbound_kbps.is_none() && self.inbound_kbps.is_none()
    }
}

/// Destination for rate reports
pub trait RateSink {
    fn report(&mut self, report: &RateReport);
}

/// Sink that writes reports to the log
pub struct LogSink;

impl RateSink for LogSink {
    fn report(&mut self, report: &RateReport) {
        if let Some(kbps) = report.outbound_kbps {
            log::info!("GATT NOTIFICATION : Server Throughput (TX) = {} kbps", kbps);
        }
        if let Some(kbps) = report.inbound_kbps {
            log::info!("GATT WRITE        : Server Throughput (RX) = {} kbps", kbps);
        }
    }
}

/// Converts byte counts to a bit rate over a fixed window
pub fn kbps(bytes: u32, window_ms: u32) -> u32 {
    let window_ms = u64::from(window_ms.max(1));
    let rate = u64::from(bytes) * 8 / window_ms;
    u32::try_from(rate).unwrap_or(u32::MAX)
}

/// Samples the shared counters once per window
pub struct RateReporter<'a> {
    ctx: &'a ThroughputContext,
}

impl<'a> RateReporter<'a> {
    pub fn new(ctx: &'a ThroughputContext) -> Self {
        Self { ctx }
    }

    /// Read-and-zero both counters and compute the window's rates
    pub fn sample(&self) -> RateReport {
        let counts = self.ctx.counters.take();
        let window_ms = self.ctx.sampler.window_ms();
        let connected = self.ctx.is_connected();

        let outbound_kbps = (connected
            && self.ctx.notifications_enabled()
            && counts.outbound_bytes != 0)
            .then(|| kbps(counts.outbound_bytes, window_ms));
        let inbound_kbps =
            (connected && counts.inbound_bytes != 0).then(|| kbps(counts.inbound_bytes, window_ms));

        RateReport {
            outbound_kbps,
            inbound_kbps,
        }
    }

    /// Sample and forward to the sink if anything was measured
    pub fn sample_into<S: RateSink>(&self, sink: &mut S) -> RateReport {
        let report = self.sample();
        if !report.is_empty() {
            sink.report(&report);
        }
        report
    }

    /// Wait for each scheduler tick and report, for as long as the process runs.
    ///
    /// `now_ms` supplies monotonic time and `sleep_until` suspends until the
    /// given instant.
    pub async fn run<S, N, W, F>(&self, sink: &mut S, mut now_ms: N, mut sleep_until: W) -> !
    where
        S: RateSink,
        N: FnMut() -> u64,
        W: FnMut(u64) -> F,
        F: core::future::Future<Output = ()>,
    {
        let scheduler = &self.ctx.sampler;
        loop {
            match scheduler.next_deadline() {
                Some(deadline) => sleep_until(deadline).await,
                None => scheduler.wait_started().await,
            }
            if scheduler.poll(now_ms()) {
                self.sample_into(sink);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThroughputConfig;
    use core::cell::Cell;
    use core::future::Future;
    use core::pin::pin;
    use core::task::Context;
    use futures::task::noop_waker_ref;
    use std::vec::Vec;

    #[derive(Default)]
    struct RecordingSink {
        reports: Vec<RateReport>,
    }

    impl RateSink for RecordingSink {
        fn report(&mut self, report: &RateReport) {
            self.reports.push(*report);
        }
    }

    fn connected_context() -> ThroughputContext {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        ctx.set_connection(Some(1));
        ctx
    }

    #[test]
    fn test_window_rate() {
        let ctx = connected_context();
        ctx.set_notifications_enabled(true);
        for _ in 0..100 {
            ctx.counters.add_outbound(244);
        }

        let report = RateReporter::new(&ctx).sample();
        // 244 * 100 * 8 / 5000
        assert_eq!(report.outbound_kbps, Some(39));
        assert_eq!(report.inbound_kbps, None);
        assert_eq!(ctx.counters.outbound(), 0);
    }

    #[test]
    fn test_zero_counters_produce_no_report() {
        let ctx = connected_context();
        ctx.set_notifications_enabled(true);
        let mut sink = RecordingSink::default();

        let report = RateReporter::new(&ctx).sample_into(&mut sink);
        assert!(report.is_empty());
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn test_outbound_requires_enable_inbound_does_not() {
        let ctx = connected_context();
        ctx.counters.add_outbound(5000);
        ctx.counters.add_inbound(5000);

        let report = RateReporter::new(&ctx).sample();
        assert_eq!(report.outbound_kbps, None);
        assert_eq!(report.inbound_kbps, Some(8));
        // Drained even when not reported
        assert_eq!(ctx.counters.outbound(), 0);
    }

    #[test]
    fn test_kbps() {
        assert_eq!(kbps(0, 5000), 0);
        assert_eq!(kbps(625_000, 5000), 1000);
        assert_eq!(kbps(u32::MAX, 1), u32::MAX);
    }

    /// Run the reporter on a virtual clock where every sleep completes
    /// instantly, until `max_sleeps` sleeps have finished or it parks.
    ///
    /// `on_sleep` sees the sleep number (from 1) before the sleep returns.
    /// Returns the requested deadlines and the reports emitted.
    fn drive<H: FnMut(usize)>(
        ctx: &ThroughputContext,
        max_sleeps: usize,
        mut on_sleep: H,
    ) -> (Vec<u64>, Vec<RateReport>) {
        let now = Cell::new(0u64);
        let mut deadlines = Vec::new();
        let mut sink = RecordingSink::default();
        let reporter = RateReporter::new(ctx);

        {
            let run = pin!(reporter.run(
                &mut sink,
                || now.get(),
                |deadline| {
                    now.set(deadline);
                    deadlines.push(deadline);
                    on_sleep(deadlines.len());
                    let park = deadlines.len() > max_sleeps;
                    async move {
                        if park {
                            core::future::pending::<()>().await;
                        }
                    }
                },
            ));
            assert!(run
                .poll(&mut Context::from_waker(noop_waker_ref()))
                .is_pending());
        }

        (deadlines, sink.reports)
    }

    #[test]
    fn test_run_reports_once_per_window() {
        let ctx = connected_context();
        ctx.set_notifications_enabled(true);
        ctx.sampler.start(0);

        let (deadlines, reports) = drive(&ctx, 3, |_| ctx.counters.add_outbound(24_400));

        assert_eq!(deadlines, [5000, 10_000, 15_000, 20_000]);
        assert_eq!(reports.len(), 3);
        assert!(reports
            .iter()
            .all(|r| r.outbound_kbps == Some(39) && r.inbound_kbps.is_none()));
    }

    #[test]
    fn test_run_waits_for_start() {
        let ctx = connected_context();
        ctx.counters.add_inbound(5000);

        let (deadlines, reports) = drive(&ctx, 3, |_| {});

        assert!(deadlines.is_empty());
        assert!(reports.is_empty());
        assert_eq!(ctx.counters.inbound(), 5000);
    }

    #[test]
    fn test_run_no_report_after_stop() {
        let ctx = connected_context();
        ctx.sampler.start(0);

        let (deadlines, reports) = drive(&ctx, 5, |n| {
            ctx.counters.add_inbound(5000);
            if n == 2 {
                ctx.sampler.stop();
            }
        });

        // Parked waiting for a restart after the second sleep
        assert_eq!(deadlines, [5000, 10_000]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].inbound_kbps, Some(8));
    }

    #[test]
    fn test_run_restart_realigns() {
        let ctx = connected_context();
        ctx.sampler.start(0);

        let (deadlines, reports) = drive(&ctx, 2, |n| {
            ctx.counters.add_inbound(5000);
            if n == 2 {
                // Reconnect at 8000 while the reporter sleeps toward 10000
                ctx.sampler.stop();
                ctx.sampler.start(8000);
            }
        });

        assert_eq!(deadlines, [5000, 10_000, 13_000]);
        assert_eq!(reports.len(), 1);
    }
}
