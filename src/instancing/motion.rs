//! Deformation motion keys for point positions.

use super::sampled::{SampledArray, evenly_spaced};
use crate::sync::MotionTiming;

/// Position keys ready for a keyed renderer array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionKeys {
    pub times: Vec<f32>,
    pub keys: Vec<Vec<[f32; 3]>>,
    /// Set when the input could not be used as authored.
    pub degraded: Option<String>,
}

impl PositionKeys {
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

fn extrapolate(p: [f32; 3], v: Option<[f32; 3]>, a: Option<[f32; 3]>, t: f32) -> [f32; 3] {
    let v = v.unwrap_or_default();
    let a = a.unwrap_or_default();
    std::array::from_fn(|i| p[i] + v[i] * t + 0.5 * a[i] * t * t)
}

/// Turns sampled positions into motion keys.
///
/// Velocities and accelerations that match the base sample's vertex count
/// win: `key_count` keys are synthesized evenly across the shutter as
/// `p + v·dt + ½·a·dt²`, with `dt` the key time (in frames) converted to
/// seconds. Otherwise samples sharing one vertex count pass through, and
/// samples with varying counts collapse to the one closest to time zero.
pub fn extrapolate_positions(
    samples: &SampledArray<Vec<[f32; 3]>>,
    velocities: &[[f32; 3]],
    accelerations: &[[f32; 3]],
    timing: &MotionTiming,
    key_count: usize,
) -> PositionKeys {
    let n = samples.len();
    if n == 0 {
        return PositionKeys {
            degraded: Some("no position samples".to_string()),
            ..Default::default()
        };
    }
    let values = &samples.values[..n];
    let times = &samples.times[..n];

    if !timing.is_instantaneous() && key_count > 0 {
        let base = times
            .iter()
            .position(|t| *t == 0.0)
            .or_else(|| values.iter().position(|v| !velocities.is_empty() && v.len() == velocities.len()))
            .or_else(|| {
                values
                    .iter()
                    .position(|v| !accelerations.is_empty() && v.len() == accelerations.len())
            });
        if let Some(base) = base {
            let positions = &values[base];
            let has_velocity = !velocities.is_empty() && velocities.len() == positions.len();
            let has_acceleration = !accelerations.is_empty() && accelerations.len() == positions.len();
            if has_velocity || has_acceleration {
                let t0 = times[base];
                let key_times = evenly_spaced(timing.shutter[0], timing.shutter[1], key_count);
                let seconds = timing.frame_duration();
                let keys = key_times
                    .iter()
                    .map(|&t| {
                        let dt = (t - t0) * seconds;
                        positions
                            .iter()
                            .enumerate()
                            .map(|(i, p)| {
                                extrapolate(
                                    *p,
                                    has_velocity.then(|| velocities[i]),
                                    has_acceleration.then(|| accelerations[i]),
                                    dt,
                                )
                            })
                            .collect()
                    })
                    .collect();
                return PositionKeys {
                    times: key_times,
                    keys,
                    degraded: None,
                };
            }
        }
    }

    let count = values[0].len();
    if values.iter().all(|v| v.len() == count) {
        return PositionKeys {
            times: times.to_vec(),
            keys: values.to_vec(),
            degraded: None,
        };
    }

    let closest = samples.closest_index(0.0).unwrap_or(0);
    PositionKeys {
        times: vec![times[closest]],
        keys: vec![values[closest].clone()],
        degraded: Some(format!(
            "vertex count changes across {n} samples and no velocities are authored, using a single key"
        )),
    }
}
