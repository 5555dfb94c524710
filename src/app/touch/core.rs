use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use super::{classify::classify_trace, velocity::PointerVelocity};
use crate::app::{
    config::CaptureConfig,
    types::{
        CaptureEvent, CaptureMode, Direction, PointerAction, PointerEvent, PointerId,
        PointerSample, TouchPoint,
    },
};

/// Samples of one finger during one gesture.
struct FingerTrace {
    /// `None` once the finger has been released.
    pointer_id: Option<PointerId>,
    valid: bool,
    points: Vec<TouchPoint>,
    velocity: PointerVelocity,
}

impl FingerTrace {
    fn new(pointer_id: PointerId, first: TouchPoint, valid: bool) -> Self {
        let mut velocity = PointerVelocity::default();
        velocity.add(first.t_ms, first.x, first.y);
        Self {
            pointer_id: Some(pointer_id),
            valid,
            points: vec![first],
            velocity,
        }
    }

    fn is_active(&self, pointer_id: PointerId) -> bool {
        self.pointer_id == Some(pointer_id)
    }
}

#[derive(Debug, Default)]
pub struct CaptureOutput {
    pub events: [Option<CaptureEvent>; 3],
    pub(crate) session_started: bool,
    pub(crate) session_ended: bool,
    pub(crate) points_appended: bool,
}

impl CaptureOutput {
    pub fn into_events(self) -> impl Iterator<Item = CaptureEvent> {
        self.events.into_iter().flatten()
    }
}

#[derive(Debug)]
enum CaptureHsmEvent {
    Pointer(PointerEvent),
    SetMode(CaptureMode),
}

#[derive(Default)]
struct DispatchContext {
    output: CaptureOutput,
}

impl DispatchContext {
    fn emit(&mut self, event: CaptureEvent) {
        for slot in &mut self.output.events {
            if slot.is_none() {
                *slot = Some(event);
                return;
            }
        }
        log::warn!("touch: output_overflow dropped={}", event.label());
    }
}

pub struct CaptureEngine {
    machine: statig::blocking::StateMachine<CaptureHsm>,
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            machine: CaptureHsm::new(config).state_machine(),
        }
    }

    pub fn handle(&mut self, event: &PointerEvent) -> CaptureOutput {
        self.dispatch(CaptureHsmEvent::Pointer(event.clone()))
    }

    pub fn set_mode(&mut self, mode: CaptureMode) {
        let _ = self.dispatch(CaptureHsmEvent::SetMode(mode));
    }

    fn dispatch(&mut self, event: CaptureHsmEvent) -> CaptureOutput {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        context.output
    }
}

struct CaptureHsm {
    config: CaptureConfig,
    mode: CaptureMode,
    traces: Vec<FingerTrace>,
}

impl CaptureHsm {
    fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            mode: CaptureMode::Gesture,
            traces: Vec::new(),
        }
    }

    fn mirror(&self, sample: &PointerSample) -> TouchPoint {
        TouchPoint {
            x: self.config.screen_width - sample.x,
            y: sample.y,
            t_ms: sample.t_ms,
            orientation_rad: sample.orientation_rad,
            velocity: 0.0,
        }
    }

    fn start_is_valid(&self, point: &TouchPoint) -> bool {
        let gap = self.config.edge_gap_px;
        point.x >= gap && point.x <= self.config.screen_width - gap
    }

    fn has_active(&self, pointer_id: PointerId) -> bool {
        self.traces.iter().any(|t| t.is_active(pointer_id))
    }

    fn active_count(&self) -> usize {
        self.traces.iter().filter(|t| t.pointer_id.is_some()).count()
    }

    fn valid_points(&self) -> Option<&[TouchPoint]> {
        self.traces
            .iter()
            .find(|t| t.valid)
            .map(|t| t.points.as_slice())
    }

    fn direction(&self) -> Direction {
        classify_trace(self.valid_points(), &self.config)
    }

    fn begin_session(&mut self, context: &mut DispatchContext, sample: &PointerSample) {
        self.traces.clear();
        context.output.session_started = true;
        context.emit(CaptureEvent::GestureStarted);
        self.add_trace(sample);
    }

    fn add_trace(&mut self, sample: &PointerSample) {
        let point = self.mirror(sample);
        // Only one trace per session may ever drive classification.
        let valid = self.start_is_valid(&point) && self.valid_points().is_none();
        log::debug!(
            "touch: trace_add pointer={} x={:.1} y={:.1} valid={}",
            sample.pointer_id,
            point.x,
            point.y,
            valid
        );
        self.traces.push(FingerTrace::new(sample.pointer_id, point, valid));
    }

    fn append_samples(&mut self, context: &mut DispatchContext, samples: &[PointerSample]) {
        let screen_width = self.config.screen_width;
        for trace in &mut self.traces {
            let Some(pointer_id) = trace.pointer_id else {
                continue;
            };
            let start = trace.points.len();
            for sample in samples.iter().filter(|s| s.pointer_id == pointer_id) {
                let x = screen_width - sample.x;
                trace.velocity.add(sample.t_ms, x, sample.y);
                trace.points.push(TouchPoint {
                    x,
                    y: sample.y,
                    t_ms: sample.t_ms,
                    orientation_rad: sample.orientation_rad,
                    velocity: 0.0,
                });
            }
            if trace.points.len() > start {
                let speed = trace.velocity.speed();
                for point in &mut trace.points[start..] {
                    point.velocity = speed;
                }
                context.output.points_appended = true;
            }
        }
    }

    fn release(&mut self, pointer_id: PointerId) {
        for trace in &mut self.traces {
            if trace.is_active(pointer_id) {
                trace.pointer_id = None;
            }
        }
    }

    fn discard(&mut self, pointer_id: PointerId) {
        self.traces.retain(|t| !t.is_active(pointer_id));
    }

    fn finish_session(&mut self, context: &mut DispatchContext) {
        match self.valid_points() {
            Some(points) if points.len() >= 2 => match self.mode {
                CaptureMode::Gesture => {
                    log::info!("touch: gesture_finished points={}", points.len());
                    let points = points.to_vec();
                    context.emit(CaptureEvent::GestureFinished { points });
                }
                CaptureMode::Selection => {
                    let direction = self.direction();
                    log::info!(
                        "touch: direction_confirmed angle={} distance={}",
                        direction.angle(),
                        direction.distance()
                    );
                    context.emit(CaptureEvent::DirectionHeard(direction));
                    context.emit(CaptureEvent::DirectionConfirmed(direction));
                }
            },
            Some(points) => {
                log::debug!("touch: gesture_dropped points={}", points.len());
            }
            None => {
                log::debug!("touch: gesture_dropped reason=no_valid_trace");
            }
        }
        self.end_session(context);
    }

    fn end_session(&mut self, context: &mut DispatchContext) {
        self.traces.clear();
        context.output.session_ended = true;
    }
}

#[state_machine(initial = "State::idle()")]
impl CaptureHsm {
    #[state]
    fn idle(&mut self, context: &mut DispatchContext, event: &CaptureHsmEvent) -> Outcome<State> {
        match event {
            CaptureHsmEvent::SetMode(mode) => {
                self.mode = *mode;
                Handled
            }
            CaptureHsmEvent::Pointer(pointer) => match (pointer.action, pointer.primary()) {
                (PointerAction::Down, Some(sample)) => {
                    log::info!("touch: session_start pointer={}", sample.pointer_id);
                    self.begin_session(context, sample);
                    Transition(State::tracking())
                }
                _ => Handled,
            },
        }
    }

    #[state]
    fn tracking(
        &mut self,
        context: &mut DispatchContext,
        event: &CaptureHsmEvent,
    ) -> Outcome<State> {
        match event {
            CaptureHsmEvent::SetMode(mode) => {
                self.mode = *mode;
                Handled
            }
            CaptureHsmEvent::Pointer(pointer) => match pointer.action {
                PointerAction::Down => {
                    let Some(sample) = pointer.primary() else {
                        return Handled;
                    };
                    if self.has_active(sample.pointer_id) {
                        // The platform lost our up event; start over.
                        log::warn!("touch: session_restart pointer={}", sample.pointer_id);
                        self.end_session(context);
                        self.begin_session(context, sample);
                    } else {
                        self.add_trace(sample);
                    }
                    Handled
                }
                PointerAction::Move => {
                    self.append_samples(context, &pointer.samples);
                    if self.mode == CaptureMode::Selection {
                        let direction = self.direction();
                        if direction != Direction::NoTrace {
                            context.emit(CaptureEvent::DirectionHeard(direction));
                        }
                    }
                    Handled
                }
                PointerAction::Up => {
                    let pointer_id = pointer.primary().map(|s| s.pointer_id);
                    let others_active = match pointer_id {
                        Some(id) => self
                            .traces
                            .iter()
                            .any(|t| t.pointer_id.is_some() && !t.is_active(id)),
                        None => false,
                    };
                    if others_active {
                        if let Some(id) = pointer_id {
                            self.release(id);
                        }
                        Handled
                    } else {
                        self.finish_session(context);
                        Transition(State::idle())
                    }
                }
                PointerAction::Cancel => {
                    if let Some(sample) = pointer.primary() {
                        self.discard(sample.pointer_id);
                    }
                    if self.active_count() == 0 {
                        log::info!("touch: session_cancelled");
                        self.end_session(context);
                        Transition(State::idle())
                    } else {
                        Handled
                    }
                }
            },
        }
    }
}
