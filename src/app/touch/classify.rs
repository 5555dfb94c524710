use crate::app::{
    config::CaptureConfig,
    types::{Direction, TouchPoint},
};

/// Direction from `first` to `last`.
///
/// Angles grow counter-clockwise with screen "up" at 90 degrees, hence the
/// inverted y delta. The distance is the horizontal travel scaled to the
/// reference width so menu bounds do not depend on the panel.
pub fn classify(first: TouchPoint, last: TouchPoint, config: &CaptureConfig) -> Direction {
    classify_delta(
        (last.x - first.x) as f64,
        (last.y - first.y) as f64,
        config,
    )
}

pub fn classify_delta(dx: f64, dy: f64, config: &CaptureConfig) -> Direction {
    if dx.hypot(dy) < config.click_threshold_px {
        return Direction::Click;
    }

    let mut angle = (-dy).atan2(dx).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    let angle_deg = (angle as i32).rem_euclid(360);

    let screen_width = if config.screen_width > 0.0 {
        config.screen_width as f64
    } else {
        config.reference_width
    };
    let distance = (dx * config.reference_width / screen_width) as i32;

    Direction::Toward {
        angle_deg,
        distance,
    }
}

/// Classifies the first valid trace of a session, if there is one.
pub fn classify_trace(points: Option<&[TouchPoint]>, config: &CaptureConfig) -> Direction {
    match points {
        Some([first, .., last]) => classify(*first, *last, config),
        Some([only]) => classify(*only, *only, config),
        _ => Direction::NoTrace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CaptureConfig {
        CaptureConfig::default().with_screen_width(1080.0)
    }

    fn angle(dx: f64, dy: f64) -> i32 {
        classify_delta(dx, dy, &config()).angle()
    }

    #[test]
    fn cardinal_angles() {
        assert_eq!(angle(0.0, -100.0), 90);
        assert_eq!(angle(100.0, 0.0), 0);
        assert_eq!(angle(0.0, 100.0), 270);
        assert_eq!(angle(-100.0, 0.0), 180);
    }

    #[test]
    fn angles_stay_in_range() {
        for step in 0..72 {
            let theta = (step as f64 * 5.0 + 0.3).to_radians();
            let a = angle(200.0 * theta.cos(), -200.0 * theta.sin());
            assert!((0..360).contains(&a), "angle {a}");
        }
        assert_eq!(angle(100.0, 0.0001), 359);
    }

    #[test]
    fn short_moves_are_clicks_in_every_direction() {
        for (dx, dy) in [(9.0, 0.0), (0.0, -9.9), (-6.0, 6.0), (0.0, 0.0)] {
            let direction = classify_delta(dx, dy, &config());
            assert_eq!(direction, Direction::Click);
            assert_eq!((direction.angle(), direction.distance()), (-1, -1));
        }
    }

    #[test]
    fn distance_is_scaled_to_reference_width() {
        let narrow = CaptureConfig::default().with_screen_width(540.0);
        assert_eq!(classify_delta(100.0, 0.0, &narrow).distance(), 200);
        assert_eq!(classify_delta(-100.0, 0.0, &narrow).distance(), -200);
        assert_eq!(classify_delta(100.0, 40.0, &config()).distance(), 100);
    }

    #[test]
    fn missing_trace_is_sentinel() {
        let direction = classify_trace(None, &config());
        assert_eq!((direction.angle(), direction.distance()), (-2, -2));
    }
}
