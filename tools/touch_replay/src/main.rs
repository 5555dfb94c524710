use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

use backswipe::{
    app::config::CaptureConfig, CaptureEvent, CaptureMode, PointerAction, PointerEvent,
    PointerSample, TraceCapture,
};

const TRACE_HEADER: &str = "pointer,action,id,x,y,t_ms,orientation";

/// One replay step: a pointer event, or a capture mode switch.
#[derive(Clone, Debug, PartialEq)]
enum ReplayStep {
    Pointer(PointerEvent),
    Mode(CaptureMode),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let mut trace_path: Option<PathBuf> = None;
    let mut expect_path: Option<PathBuf> = None;
    let mut mode = CaptureMode::Gesture;
    let mut config = CaptureConfig::default();

    let mut idx = 1usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--expect" => {
                idx += 1;
                let Some(path) = args.get(idx) else {
                    return Err("missing path after --expect".into());
                };
                expect_path = Some(PathBuf::from(path));
            }
            "--mode" => {
                idx += 1;
                let Some(value) = args.get(idx) else {
                    return Err("missing value after --mode".into());
                };
                mode = parse_mode(value).ok_or_else(|| format!("unknown mode: {value}"))?;
            }
            "--screen-width" => {
                idx += 1;
                let Some(value) = args.get(idx) else {
                    return Err("missing value after --screen-width".into());
                };
                let width = value
                    .parse::<f32>()
                    .map_err(|e| format!("invalid screen width '{value}': {e}"))?;
                config = config.with_screen_width(width);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            value if value.starts_with('-') => {
                return Err(format!("unknown argument: {value}"));
            }
            value => {
                if trace_path.is_some() {
                    return Err("multiple trace paths provided".into());
                }
                trace_path = Some(PathBuf::from(value));
            }
        }
        idx += 1;
    }

    let trace_path = trace_path.ok_or_else(usage)?;
    let raw = fs::read_to_string(&trace_path)
        .map_err(|e| format!("failed to open {}: {e}", trace_path.display()))?;
    let steps = parse_trace(&raw, &trace_path)?;
    let events = replay(config, mode, &steps);

    println!("event,label,angle,distance,points");
    for event in &events {
        println!("event,{}", describe(event));
    }

    if let Some(expect_path) = expect_path {
        let raw = fs::read_to_string(&expect_path)
            .map_err(|e| format!("failed to open {}: {e}", expect_path.display()))?;
        let expected = parse_expected_labels(&raw, &expect_path)?;
        let actual: Vec<&'static str> = events.iter().map(CaptureEvent::label).collect();
        if actual != expected {
            eprintln!("expected labels: {}", expected.join(","));
            eprintln!("actual labels:   {}", actual.join(","));
            return Err("event sequence mismatch".into());
        }
    }

    Ok(())
}

fn usage() -> String {
    "usage: touch_replay <trace.csv> [--mode gesture|selection] [--screen-width px] \
     [--expect expected_labels.txt]"
        .to_string()
}

/// Stop detection runs on wall-clock time and is not part of the replay.
fn replay(config: CaptureConfig, mode: CaptureMode, steps: &[ReplayStep]) -> Vec<CaptureEvent> {
    let (mut capture, _stops) = TraceCapture::with_channel(config);
    capture.set_mode(mode);

    let mut events = Vec::new();
    for step in steps {
        match step {
            ReplayStep::Mode(mode) => capture.set_mode(*mode),
            ReplayStep::Pointer(event) => events.extend(capture.handle(event).into_events()),
        }
    }
    events
}

fn describe(event: &CaptureEvent) -> String {
    let (direction, points) = match event {
        CaptureEvent::DirectionHeard(direction) | CaptureEvent::DirectionConfirmed(direction) => {
            (Some(*direction), 0)
        }
        CaptureEvent::GestureFinished { points } => (None, points.len()),
        CaptureEvent::GestureStarted | CaptureEvent::GestureStopped => (None, 0),
    };
    let (angle, distance) = direction
        .map(|d| (d.angle().to_string(), d.distance().to_string()))
        .unwrap_or_default();
    format!("{},{angle},{distance},{points}", event.label())
}

fn parse_mode(raw: &str) -> Option<CaptureMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "gesture" => Some(CaptureMode::Gesture),
        "selection" => Some(CaptureMode::Selection),
        _ => None,
    }
}

/// Rows are `pointer,<action>,<id>,<x>,<y>,<t_ms>[,<orientation>]` or
/// `mode,<gesture|selection>`. A `move+` row joins the preceding move batch.
fn parse_trace(raw: &str, path: &Path) -> Result<Vec<ReplayStep>, String> {
    let mut out: Vec<ReplayStep> = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line_no = line_no + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed == TRACE_HEADER {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        match parts[0] {
            "mode" => {
                let mode = parts
                    .get(1)
                    .and_then(|value| parse_mode(value))
                    .ok_or_else(|| format!("{}:{line_no} invalid mode row", path.display()))?;
                out.push(ReplayStep::Mode(mode));
            }
            "pointer" => {
                if parts.len() < 6 {
                    return Err(format!(
                        "{}:{line_no} invalid pointer row, expected at least 6 columns",
                        path.display()
                    ));
                }
                let sample = PointerSample {
                    pointer_id: parse_field(parts[2], path, line_no, "id")?,
                    x: parse_field(parts[3], path, line_no, "x")?,
                    y: parse_field(parts[4], path, line_no, "y")?,
                    t_ms: parse_field(parts[5], path, line_no, "t_ms")?,
                    orientation_rad: match parts.get(6) {
                        Some(raw) => parse_field(raw, path, line_no, "orientation")?,
                        None => 0.0,
                    },
                };
                let event = match parts[1] {
                    "down" => PointerEvent::down(sample),
                    "up" => PointerEvent::up(sample),
                    "cancel" => PointerEvent::cancel(sample),
                    "move" => PointerEvent::moved(vec![sample]),
                    "move+" => match out.last_mut() {
                        Some(ReplayStep::Pointer(batch)) if batch.action == PointerAction::Move => {
                            batch.samples.push(sample);
                            continue;
                        }
                        _ => {
                            return Err(format!(
                                "{}:{line_no} move+ without a preceding move",
                                path.display()
                            ))
                        }
                    },
                    other => {
                        return Err(format!(
                            "{}:{line_no} invalid pointer action: {other}",
                            path.display()
                        ))
                    }
                };
                out.push(ReplayStep::Pointer(event));
            }
            _ => continue,
        }
    }
    Ok(out)
}

fn parse_expected_labels(raw: &str, path: &Path) -> Result<Vec<&'static str>, String> {
    let mut labels = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let token = line.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }
        let label = normalize_label(token).ok_or_else(|| {
            format!(
                "{}:{} invalid expected event label: {}",
                path.display(),
                line_no + 1,
                token
            )
        })?;
        labels.push(label);
    }
    Ok(labels)
}

fn normalize_label(label: &str) -> Option<&'static str> {
    match label.trim().to_ascii_lowercase().as_str() {
        "start" => Some("start"),
        "finished" => Some("finished"),
        "heard" => Some("heard"),
        "confirmed" => Some("confirmed"),
        "stopped" => Some("stopped"),
        _ => None,
    }
}

fn parse_field<T>(raw: &str, path: &Path, line_no: usize, field: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        format!(
            "{}:{} invalid {} '{}': {}",
            path.display(),
            line_no,
            field,
            raw.trim(),
            e
        )
    })
}
