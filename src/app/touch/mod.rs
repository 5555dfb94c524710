//! Trace capture: pointer events in, gesture and selection events out.

pub mod classify;
mod core;
pub mod liveness;
mod velocity;

use crossbeam_channel::{Receiver, Sender};

pub use self::core::CaptureOutput;
use self::{
    core::CaptureEngine,
    liveness::{GestureStopSignal, LivenessTimer},
};
use crate::app::{
    config::CaptureConfig,
    types::{CaptureEvent, CaptureMode, PointerEvent},
};

/// Owns the capture state machine and the liveness timer of the running
/// gesture. Lives on the interaction thread; feed it pointer events in
/// arrival order and route [`GestureStopSignal`]s back through
/// [`TraceCapture::on_stop_signal`].
pub struct TraceCapture {
    engine: CaptureEngine,
    liveness: LivenessTimer,
    mode: CaptureMode,
    generation: Option<u64>,
}

impl TraceCapture {
    pub fn new(config: CaptureConfig, stop_signals: Sender<GestureStopSignal>) -> Self {
        let liveness = LivenessTimer::new(config.liveness_tick(), config.stop_gap_ms, stop_signals);
        Self {
            engine: CaptureEngine::new(config),
            liveness,
            mode: CaptureMode::Gesture,
            generation: None,
        }
    }

    /// Convenience constructor returning the receiving end of the stop signals.
    pub fn with_channel(config: CaptureConfig) -> (Self, Receiver<GestureStopSignal>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(config, tx), rx)
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CaptureMode) {
        if self.mode != mode {
            log::debug!("touch: mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.engine.set_mode(mode);
    }

    pub fn in_session(&self) -> bool {
        self.generation.is_some()
    }

    pub fn handle(&mut self, event: &PointerEvent) -> CaptureOutput {
        let output = self.engine.handle(event);

        // A restart reports both flags; retire the old generation first.
        if output.session_ended {
            self.liveness.disarm();
            self.generation = None;
        }
        if output.session_started {
            self.generation = Some(self.liveness.arm());
        } else if output.points_appended {
            self.liveness.touch();
        }
        output
    }

    /// Accepts a stop signal only for the gesture that is still running.
    pub fn on_stop_signal(&mut self, signal: GestureStopSignal) -> Option<CaptureEvent> {
        if self.generation == Some(signal.generation) && self.liveness.is_armed() {
            log::info!("touch: gesture_stopped generation={}", signal.generation);
            Some(CaptureEvent::GestureStopped)
        } else {
            log::debug!(
                "touch: stale_stop_signal generation={} current={:?}",
                signal.generation,
                self.generation
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::types::PointerSample;

    fn sample(x: f32, y: f32, t_ms: i64) -> PointerSample {
        PointerSample {
            pointer_id: 0,
            x,
            y,
            t_ms,
            orientation_rad: 0.0,
        }
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            liveness_tick_ms: 2,
            stop_gap_ms: 20,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn idle_finger_reports_stop_once() {
        let (mut capture, stops) = TraceCapture::with_channel(fast_config());
        capture.handle(&PointerEvent::down(sample(500.0, 500.0, 0)));

        let signal = stops.recv_timeout(Duration::from_secs(2)).expect("stop");
        assert_eq!(
            capture.on_stop_signal(signal),
            Some(CaptureEvent::GestureStopped)
        );
        assert!(stops.recv_timeout(Duration::from_millis(60)).is_err());
    }

    #[test]
    fn stop_from_previous_gesture_is_ignored() {
        let (mut capture, stops) = TraceCapture::with_channel(fast_config());
        capture.handle(&PointerEvent::down(sample(500.0, 500.0, 0)));
        let stale = stops.recv_timeout(Duration::from_secs(2)).expect("stop");
        capture.handle(&PointerEvent::up(sample(500.0, 500.0, 50)));
        capture.handle(&PointerEvent::down(sample(400.0, 400.0, 80)));

        assert_eq!(capture.on_stop_signal(stale), None);
        assert!(capture.in_session());
    }

    #[test]
    fn release_cancels_pending_stop() {
        let config = CaptureConfig {
            liveness_tick_ms: 2,
            stop_gap_ms: 80,
            ..CaptureConfig::default()
        };
        let (mut capture, stops) = TraceCapture::with_channel(config);
        capture.handle(&PointerEvent::down(sample(500.0, 500.0, 0)));
        capture.handle(&PointerEvent::moved(vec![sample(480.0, 500.0, 8)]));
        capture.handle(&PointerEvent::up(sample(480.0, 500.0, 12)));

        assert!(!capture.in_session());
        assert!(stops.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn mode_is_applied_to_the_engine() {
        let (mut capture, _stops) = TraceCapture::with_channel(CaptureConfig::default());
        capture.set_mode(CaptureMode::Selection);
        assert_eq!(capture.mode(), CaptureMode::Selection);

        capture.handle(&PointerEvent::down(sample(500.0, 500.0, 0)));
        capture.handle(&PointerEvent::moved(vec![sample(300.0, 500.0, 16)]));
        let events: Vec<_> = capture
            .handle(&PointerEvent::up(sample(300.0, 500.0, 20)))
            .into_events()
            .collect();
        assert!(matches!(
            events.last(),
            Some(CaptureEvent::DirectionConfirmed(_))
        ));
    }
}
