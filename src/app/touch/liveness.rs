//! Gesture-stopped detection.
//!
//! Every gesture session arms the detector under a fresh generation. The
//! background ticker only ever reports its own generation, and the capture
//! facade drops any signal whose generation is no longer current, so a late
//! tick from a finished gesture can never leak into the next one.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GestureStopSignal {
    pub generation: u64,
}

/// Clock-free stop rule; the ticker thread and the tests both drive it.
#[derive(Clone, Copy, Debug)]
pub struct LivenessWatch {
    stop_gap_ms: u64,
    last_point_ms: u64,
    fired: bool,
}

impl LivenessWatch {
    pub fn new(stop_gap_ms: u64, now_ms: u64) -> Self {
        Self {
            stop_gap_ms,
            last_point_ms: now_ms,
            fired: false,
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_point_ms = now_ms;
    }

    /// Returns true exactly once, on the first poll past the stop gap.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.fired {
            return false;
        }
        if now_ms.saturating_sub(self.last_point_ms) > self.stop_gap_ms {
            self.fired = true;
            return true;
        }
        false
    }
}

struct Shared {
    generation: AtomicU64,
    last_touch_ms: AtomicU64,
    origin: Instant,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

pub struct LivenessTimer {
    shared: Arc<Shared>,
    tick: Duration,
    stop_gap_ms: u64,
    signals: Sender<GestureStopSignal>,
    armed: bool,
}

impl LivenessTimer {
    pub fn new(tick: Duration, stop_gap_ms: u64, signals: Sender<GestureStopSignal>) -> Self {
        Self {
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                last_touch_ms: AtomicU64::new(0),
                origin: Instant::now(),
            }),
            tick,
            stop_gap_ms,
            signals,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Starts ticking for a new session and returns its generation.
    pub fn arm(&mut self) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared
            .last_touch_ms
            .store(self.shared.now_ms(), Ordering::Release);
        self.armed = true;

        let shared = Arc::clone(&self.shared);
        let signals = self.signals.clone();
        let tick = self.tick;
        let stop_gap_ms = self.stop_gap_ms;
        let spawned = thread::Builder::new()
            .name(format!("liveness-{generation}"))
            .spawn(move || {
                let mut watch =
                    LivenessWatch::new(stop_gap_ms, shared.last_touch_ms.load(Ordering::Acquire));
                loop {
                    thread::sleep(tick);
                    if shared.generation.load(Ordering::Acquire) != generation {
                        return;
                    }
                    watch.touch(shared.last_touch_ms.load(Ordering::Acquire));
                    if watch.poll(shared.now_ms()) {
                        log::debug!("touch: liveness_stop generation={generation}");
                        let _ = signals.send(GestureStopSignal { generation });
                        return;
                    }
                }
            });
        if let Err(err) = spawned {
            log::warn!("touch: liveness_spawn_failed err={err}");
        }
        generation
    }

    pub fn touch(&self) {
        if self.armed {
            self.shared
                .last_touch_ms
                .store(self.shared.now_ms(), Ordering::Release);
        }
    }

    /// Retires the current generation; its ticker exits on its next tick.
    pub fn disarm(&mut self) {
        if self.armed {
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            self.armed = false;
        }
    }
}

impl Drop for LivenessTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_fires_once_after_gap() {
        let mut watch = LivenessWatch::new(300, 1_000);
        assert!(!watch.poll(1_200));
        assert!(!watch.poll(1_300));
        assert!(watch.poll(1_301));
        assert!(!watch.poll(1_400));
    }

    #[test]
    fn touch_pushes_deadline_out() {
        let mut watch = LivenessWatch::new(300, 0);
        watch.touch(250);
        assert!(!watch.poll(500));
        assert!(watch.poll(551));
    }

    #[test]
    fn timer_signals_current_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut timer = LivenessTimer::new(Duration::from_millis(2), 20, tx);
        let generation = timer.arm();
        let signal = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("stop signal");
        assert_eq!(signal.generation, generation);
        assert!(rx.recv_timeout(Duration::from_millis(60)).is_err());
    }

    #[test]
    fn disarmed_timer_stays_silent() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut timer = LivenessTimer::new(Duration::from_millis(2), 40, tx);
        timer.arm();
        timer.disarm();
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn rearm_retires_previous_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut timer = LivenessTimer::new(Duration::from_millis(2), 30, tx);
        let first = timer.arm();
        timer.disarm();
        let second = timer.arm();
        assert_ne!(first, second);
        let signal = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("stop signal");
        assert_eq!(signal.generation, second);
    }
}
