use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::bridge::{Bridge, BridgeEvent};
use crate::link::WirelessLink;
use crate::push::PushChannel;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_LOOP_PAUSE_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between fallback checks.
    pub tick_interval_ms: u64,
    /// Pause at the end of each iteration; inbound events are handled during it.
    pub loop_pause_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            loop_pause_ms: DEFAULT_LOOP_PAUSE_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub iterations: u64,
    pub ticks: u32,
    pub simulated_ticks: u32,
    pub events_dispatched: u64,
}

/// Single cooperative loop driving the bridge.
///
/// The loop is the only consumer of the event queue and the only caller of
/// the bridge, so bridge state is never touched from two places at once.
#[derive(Debug)]
pub struct SchedulerLoop<L, P> {
    bridge: Bridge<L, P>,
    config: SchedulerConfig,
    last_tick_ms: u64,
    stats: SchedulerStats,
}

impl<L: WirelessLink, P: PushChannel> SchedulerLoop<L, P> {
    pub fn new(bridge: Bridge<L, P>, config: SchedulerConfig) -> Self {
        Self {
            bridge,
            config,
            last_tick_ms: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// One iteration without the pause: housekeeping, then a bridge tick once
    /// strictly more than the interval has passed since the previous one.
    ///
    /// `now_ms` is milliseconds on the scheduler's own clock. Returns whether
    /// a tick ran.
    pub fn run_once(&mut self, now_ms: u64) -> bool {
        self.stats.iterations = self.stats.iterations.saturating_add(1);

        self.bridge.housekeeping();

        if now_ms.saturating_sub(self.last_tick_ms) <= self.config.tick_interval_ms {
            return false;
        }

        self.last_tick_ms = now_ms;
        self.stats.ticks = self.stats.ticks.saturating_add(1);
        if self.bridge.tick(now_ms) {
            self.stats.simulated_ticks = self.stats.simulated_ticks.saturating_add(1);
        }
        true
    }

    pub fn dispatch(&mut self, event: BridgeEvent) {
        self.stats.events_dispatched = self.stats.events_dispatched.saturating_add(1);
        self.bridge.handle_event(event);
    }

    /// Run until `shutdown` resolves or every event sender is gone.
    pub async fn run<F>(&mut self, mut events: mpsc::Receiver<BridgeEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let pause = Duration::from_millis(self.config.loop_pause_ms);
        tokio::pin!(shutdown);

        info!(
            "Scheduler loop started: tick every {} ms, pause {} ms",
            self.config.tick_interval_ms, self.config.loop_pause_ms
        );

        loop {
            let now_ms = start.elapsed().as_millis() as u64;
            self.run_once(now_ms);

            let pause_timer = time::sleep(pause);
            tokio::pin!(pause_timer);

            loop {
                tokio::select! {
                    () = &mut shutdown => {
                        info!("Scheduler loop stopping after {} iterations", self.stats.iterations);
                        return;
                    }
                    () = &mut pause_timer => break,
                    event = events.recv() => match event {
                        Some(event) => self.dispatch(event),
                        None => {
                            debug!("Event queue closed");
                            info!("Scheduler loop stopping after {} iterations", self.stats.iterations);
                            return;
                        }
                    },
                }
            }
        }
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn get_config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn get_bridge(&self) -> &Bridge<L, P> {
        &self.bridge
    }

    pub fn get_bridge_mut(&mut self) -> &mut Bridge<L, P> {
        &mut self.bridge
    }

    pub fn into_bridge(self) -> Bridge<L, P> {
        self.bridge
    }
}
