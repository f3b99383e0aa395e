//! Periodic refresh loop
//!
//! Monitor mode reruns the whole scan, aggregate and render cycle, sleeps, and
//! repeats until a shutdown signal arrives. Each cycle starts from scratch;
//! nothing carries over except the cycle counter.
//!
//! The clock and the sleeper are injected so tests can drive the loop without
//! waiting:
//!
//! ```rust,no_run
//! use claude_usage_chart::monitor::{MonitorLoop, TokioSleeper};
//! use claude_usage_chart::time::SystemClock;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let monitor = MonitorLoop::new(SystemClock, TokioSleeper, Duration::from_secs(3600));
//! monitor
//!     .run(|cycle, now| {
//!         println!("cycle {} at {}", cycle, now);
//!         Ok(())
//!     }, async { let _ = tokio::signal::ctrl_c().await; })
//!     .await;
//! # Ok(())
//! # }
//! ```

use crate::logging::cycle_span;
use crate::time::Clock;
use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{info, warn};

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Why [`MonitorLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    CycleLimit,
}

pub struct MonitorLoop<C, S> {
    clock: C,
    sleeper: S,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl<C: Clock, S: Sleeper> MonitorLoop<C, S> {
    pub fn new(clock: C, sleeper: S, interval: Duration) -> Self {
        Self {
            clock,
            sleeper,
            interval,
            max_cycles: None,
        }
    }

    /// Stop after `cycles` completed cycles.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Run `cycle` now and after every interval until `shutdown` resolves.
    ///
    /// A failing cycle is logged and the loop carries on.
    pub async fn run<F, Sh>(&self, mut cycle: F, shutdown: Sh) -> StopReason
    where
        F: FnMut(u64, DateTime<Utc>) -> Result<()>,
        Sh: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut count: u64 = 0;

        loop {
            count += 1;
            let span = cycle_span(count);
            let now = self.clock.now();
            span.in_scope(|| match cycle(count, now) {
                Ok(()) => info!("Cycle complete"),
                Err(e) => warn!(error = %e, "Cycle failed; retrying after the interval"),
            });

            if self.max_cycles.is_some_and(|max| count >= max) {
                return StopReason::CycleLimit;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles = count, "Monitor stopped");
                    return StopReason::Shutdown;
                }
                _ = self.sleeper.sleep(self.interval) => {}
            }
        }
    }
}

/// Clear the terminal and home the cursor before a redraw.
pub fn clear_screen() -> Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
    stdout.flush()?;
    Ok(())
}
