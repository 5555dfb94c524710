//! Per-pointer velocity estimate.
//!
//! Impulse strategy: the velocity is derived from the kinetic energy the
//! finger imparts over the recent samples rather than from a plain
//! first/last difference, so a single jittery sample does not dominate.

use crate::app::config::VELOCITY_UNIT_MS;

const HISTORY_SIZE: usize = 20;
const HORIZON_MS: i64 = 100;
const ASSUME_STOPPED_MS: i64 = 40;

#[derive(Clone, Copy, Default)]
struct AxisSample {
    t_ms: i64,
    value: f32,
}

#[derive(Clone)]
struct AxisTracker {
    samples: [Option<AxisSample>; HISTORY_SIZE],
    index: usize,
}

impl Default for AxisTracker {
    fn default() -> Self {
        Self {
            samples: [None; HISTORY_SIZE],
            index: 0,
        }
    }
}

impl AxisTracker {
    fn add(&mut self, t_ms: i64, value: f32) {
        self.index = (self.index + 1) % HISTORY_SIZE;
        self.samples[self.index] = Some(AxisSample { t_ms, value });
    }

    /// Units per millisecond.
    fn velocity_per_ms(&self) -> f32 {
        let mut values = [0.0f32; HISTORY_SIZE];
        let mut times = [0.0f32; HISTORY_SIZE];
        let mut count = 0usize;

        let Some(newest) = self.samples[self.index] else {
            return 0.0;
        };

        let mut cursor = self.index;
        let mut previous = newest;
        while let Some(sample) = self.samples[cursor] {
            let age = newest.t_ms - sample.t_ms;
            let gap = (sample.t_ms - previous.t_ms).abs();
            previous = sample;
            if age > HORIZON_MS || gap > ASSUME_STOPPED_MS {
                break;
            }

            values[count] = sample.value;
            times[count] = -(age as f32);
            count += 1;
            if count >= HISTORY_SIZE {
                break;
            }
            cursor = if cursor == 0 {
                HISTORY_SIZE - 1
            } else {
                cursor - 1
            };
        }

        if count < 2 {
            return 0.0;
        }
        impulse_velocity(&values[..count], &times[..count])
    }
}

// Samples are newest first; `times` are non-positive ages.
fn impulse_velocity(values: &[f32], times: &[f32]) -> f32 {
    let start = values.len() - 1;
    let mut work = 0.0f32;
    for i in (1..=start).rev() {
        let t_older = times[i];
        let t_newer = times[i - 1];
        if t_older == t_newer {
            continue;
        }
        let v_curr = (values[i - 1] - values[i]) / (t_newer - t_older);
        let v_prev = energy_to_velocity(work);
        work += (v_curr - v_prev) * v_curr.abs();
        if i == start {
            work *= 0.5;
        }
    }
    energy_to_velocity(work)
}

fn energy_to_velocity(energy: f32) -> f32 {
    energy.signum() * (2.0 * energy.abs()).sqrt()
}

/// Two-axis tracker for one finger.
#[derive(Clone, Default)]
pub struct PointerVelocity {
    x: AxisTracker,
    y: AxisTracker,
}

impl PointerVelocity {
    pub fn add(&mut self, t_ms: i64, x: f32, y: f32) {
        self.x.add(t_ms, x);
        self.y.add(t_ms, y);
    }

    /// Speed magnitude in px per [`VELOCITY_UNIT_MS`].
    pub fn speed(&self) -> f32 {
        let vx = self.x.velocity_per_ms() * VELOCITY_UNIT_MS;
        let vy = self.y.velocity_per_ms() * VELOCITY_UNIT_MS;
        let speed = vx.hypot(vy);
        if speed.is_finite() {
            speed
        } else {
            0.0
        }
    }
}
