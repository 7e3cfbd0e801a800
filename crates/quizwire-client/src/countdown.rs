use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events emitted by a running countdown. Each carries the generation of
/// the `start` call that produced it, so consumers can discard events from
/// a countdown that has since been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick {
        generation: u64,
        remaining_secs: u32,
    },
    Expired {
        generation: u64,
    },
}

/// A cancellable, restartable per-question countdown.
///
/// Emits one `Tick` per interval with the remaining seconds, then a single
/// terminal `Expired`, after which the task stops on its own. Restarting
/// tears the previous countdown down first, so two countdowns never tick
/// concurrently.
pub struct Countdown {
    events: mpsc::UnboundedSender<TimerEvent>,
    tick_interval: Duration,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    /// The tick interval is nominally one second; tests shrink it.
    pub fn new(events: mpsc::UnboundedSender<TimerEvent>, tick_interval: Duration) -> Self {
        Self {
            events,
            tick_interval,
            generation: 0,
            task: None,
        }
    }

    /// Start a countdown of `duration_secs`, cancelling any running one.
    /// Returns the generation tag attached to this run's events.
    pub fn start(&mut self, duration_secs: u32) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        self.task = Some(tokio::spawn(async move {
            if duration_secs == 0 {
                let _ = events.send(TimerEvent::Expired { generation });
                return;
            }
            let mut remaining = duration_secs;
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick of a tokio interval completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                remaining = remaining.saturating_sub(1);
                if events
                    .send(TimerEvent::Tick {
                        generation,
                        remaining_secs: remaining,
                    })
                    .is_err()
                {
                    return;
                }
                if remaining == 0 {
                    let _ = events.send(TimerEvent::Expired { generation });
                    return;
                }
            }
        }));
        generation
    }

    /// Stop the running countdown, if any. Safe to call when idle. Events
    /// already in flight keep their stale generation tag.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
