//! Pointer stream to confirmed word, without the network.

use backswipe::{
    app::{config::CaptureConfig, types::CandidateList},
    CaptureEvent, CaptureMode, Direction, MenuArity, PointerEvent, PointerSample, RadialMenu,
    TraceCapture,
};

fn sample(x: f32, y: f32, t_ms: i64) -> PointerSample {
    PointerSample {
        pointer_id: 0,
        x,
        y,
        t_ms,
        orientation_rad: 0.0,
    }
}

fn feed(capture: &mut TraceCapture, events: &[PointerEvent]) -> Vec<CaptureEvent> {
    events
        .iter()
        .flat_map(|event| capture.handle(event).into_events())
        .collect()
}

#[test]
fn upward_selection_confirms_first_ring_candidate() {
    let (mut capture, _stops) =
        TraceCapture::with_channel(CaptureConfig::default().with_screen_width(1080.0));
    capture.set_mode(CaptureMode::Selection);

    let mut menu = RadialMenu::new();
    let candidates = CandidateList::from_words(["the", "they", "then", "them"]);
    menu.open(MenuArity::Four, &candidates).expect("menu opens");

    let events = feed(
        &mut capture,
        &[
            PointerEvent::down(sample(500.0, 500.0, 0)),
            PointerEvent::moved(vec![sample(500.0, 300.0, 16)]),
            PointerEvent::up(sample(500.0, 300.0, 24)),
        ],
    );

    let mut confirmed = None;
    for event in events {
        match event {
            CaptureEvent::DirectionHeard(direction) => {
                assert_eq!(direction.angle(), 90);
                assert_eq!(menu.highlight(direction), Some(0));
            }
            CaptureEvent::DirectionConfirmed(direction) => {
                confirmed = menu.confirm(direction).expect("menu open");
            }
            _ => {}
        }
    }

    assert_eq!(confirmed.as_deref(), Some("they"));
    assert!(!menu.is_open());
}

#[test]
fn tap_in_selection_confirms_top_candidate() {
    let (mut capture, _stops) = TraceCapture::with_channel(CaptureConfig::default());
    capture.set_mode(CaptureMode::Selection);
    let mut menu = RadialMenu::new();
    menu.open(MenuArity::Nine, &CandidateList::from_words(["a", "b", "c"]))
        .expect("menu opens");

    let events = feed(
        &mut capture,
        &[
            PointerEvent::down(sample(500.0, 500.0, 0)),
            PointerEvent::moved(vec![sample(502.0, 498.0, 10)]),
            PointerEvent::up(sample(502.0, 498.0, 20)),
        ],
    );

    assert_eq!(
        events.last(),
        Some(&CaptureEvent::DirectionConfirmed(Direction::Click))
    );
    assert_eq!(
        menu.confirm(Direction::Click).expect("menu open").as_deref(),
        Some("a")
    );
}

#[test]
fn gesture_mode_emits_mirrored_trace_for_decoding() {
    let (mut capture, _stops) = TraceCapture::with_channel(CaptureConfig::default());

    let events = feed(
        &mut capture,
        &[
            PointerEvent::down(sample(800.0, 400.0, 0)),
            PointerEvent::moved(vec![sample(760.0, 410.0, 8), sample(700.0, 420.0, 16)]),
            PointerEvent::up(sample(700.0, 420.0, 24)),
        ],
    );

    let kinds: Vec<_> = events.iter().map(CaptureEvent::label).collect();
    assert_eq!(kinds, vec!["start", "finished"]);
    let CaptureEvent::GestureFinished { points } = &events[1] else {
        panic!("expected finished gesture");
    };
    let xs: Vec<f32> = points.iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![280.0, 320.0, 380.0]);
}
