//! Time-sampled values.

use glam::{DMat4, DQuat, Mat4, Quat};

/// Linear blend between two samples.
pub trait Interpolate: Clone {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Interpolate for [f32; 3] {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
    }
}

impl Interpolate for Mat4 {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        *a + (*b - *a) * t
    }
}

impl Interpolate for DMat4 {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        *a + (*b - *a) * f64::from(t)
    }
}

impl Interpolate for Quat {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        a.slerp(*b, t)
    }
}

impl Interpolate for DQuat {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        a.slerp(*b, f64::from(t))
    }
}

/// Element-wise when both arrays have the same length; otherwise the
/// earlier sample is held.
impl<T: Interpolate> Interpolate for Vec<T> {
    fn interpolate(a: &Self, b: &Self, t: f32) -> Self {
        if a.len() != b.len() {
            return a.clone();
        }
        a.iter().zip(b).map(|(x, y)| T::interpolate(x, y, t)).collect()
    }
}

/// Up to a small fixed number of `(time, value)` samples, ordered by time.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledArray<T> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
}

impl<T> Default for SampledArray<T> {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> SampledArray<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One sample at time zero.
    pub fn single(value: T) -> Self {
        Self {
            times: vec![0.0],
            values: vec![value],
        }
    }

    /// Builds from unordered pairs; extra times or values are dropped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (f32, T)>) -> Self {
        let mut pairs: Vec<(f32, T)> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = pairs.into_iter().unzip();
        Self { times, values }
    }

    pub fn len(&self) -> usize {
        self.times.len().min(self.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, time: f32, value: T) {
        self.times.push(time);
        self.values.push(value);
    }

    /// Keeps at most `max` samples.
    pub fn truncate(&mut self, max: usize) {
        self.times.truncate(max);
        self.values.truncate(max);
    }

    pub fn time_range(&self) -> Option<(f32, f32)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    /// Index of the sample closest to `time`.
    pub fn closest_index(&self, time: f32) -> Option<usize> {
        self.times
            .iter()
            .take(self.len())
            .enumerate()
            .min_by(|a, b| (a.1 - time).abs().total_cmp(&(b.1 - time).abs()))
            .map(|(i, _)| i)
    }

    /// Converts every sample, dropping the ones `f` rejects.
    pub fn filter_map<U>(&self, f: impl Fn(&T) -> Option<U>) -> SampledArray<U> {
        let mut out = SampledArray::new();
        for (t, v) in self.times.iter().zip(&self.values) {
            if let Some(u) = f(v) {
                out.push(*t, u);
            }
        }
        out
    }
}

impl<T: Interpolate> SampledArray<T> {
    /// Value at `time`, interpolated between neighbours and clamped outside
    /// the sampled range.
    pub fn resample(&self, time: f32) -> Option<T> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        if n == 1 || time <= self.times[0] {
            return Some(self.values[0].clone());
        }
        if time >= self.times[n - 1] {
            return Some(self.values[n - 1].clone());
        }
        let upper = self.times[..n].iter().position(|t| *t >= time)?;
        let lower = upper - 1;
        let span = self.times[upper] - self.times[lower];
        if span <= 0.0 {
            return Some(self.values[upper].clone());
        }
        let t = (time - self.times[lower]) / span;
        Some(T::interpolate(&self.values[lower], &self.values[upper], t))
    }
}

/// Adopts `times` when it has more samples than what was accumulated.
pub fn accumulate_sample_times(acc: &mut Vec<f32>, times: &[f32]) {
    if times.len() > acc.len() {
        *acc = times.to_vec();
    }
}

/// `count` evenly spaced times across `[start, end]`; a single key sits at
/// `start`.
pub fn evenly_spaced(start: f32, end: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..count)
            .map(|i| start + (end - start) * i as f32 / (count - 1) as f32)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_interpolates_and_clamps() {
        let s = SampledArray::from_pairs([(1.0, 10.0f32), (-1.0, 0.0)]);
        assert_eq!(s.times, vec![-1.0, 1.0]);
        assert_eq!(s.resample(0.0), Some(5.0));
        assert_eq!(s.resample(-5.0), Some(0.0));
        assert_eq!(s.resample(5.0), Some(10.0));
        assert_eq!(SampledArray::<f32>::new().resample(0.0), None);
    }

    #[test]
    fn test_resample_vectors_of_differing_length_hold() {
        let s = SampledArray::from_pairs([(0.0, vec![[0.0f32; 3]]), (1.0, vec![[1.0; 3], [2.0; 3]])]);
        assert_eq!(s.resample(0.5), Some(vec![[0.0; 3]]));
    }

    #[test]
    fn test_accumulate_prefers_more_samples() {
        let mut acc = vec![0.0];
        accumulate_sample_times(&mut acc, &[-0.5, 0.5]);
        assert_eq!(acc, vec![-0.5, 0.5]);
        accumulate_sample_times(&mut acc, &[0.0]);
        assert_eq!(acc, vec![-0.5, 0.5]);
    }

    #[test]
    fn test_evenly_spaced() {
        assert_eq!(evenly_spaced(-0.25, 0.25, 3), vec![-0.25, 0.0, 0.25]);
        assert_eq!(evenly_spaced(-0.25, 0.25, 1), vec![-0.25]);
    }

    #[test]
    fn test_closest_index() {
        let s = SampledArray::from_pairs([(-0.5, 1), (0.1, 2), (0.5, 3)]);
        assert_eq!(s.closest_index(0.0), Some(1));
    }
}
