pub mod pid2;

use embassy_time::Instant;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// First order low-pass filter, `y = alpha1 * y + alpha0 * x`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lowpass<T: Float> {
    y: T,
    alpha0: T,
    alpha1: T,
}

impl<T: Float> Lowpass<T> {
    /// Create a filter which retains `smoothing` of its previous output on
    /// every update, such that `y = smoothing * y + (1 - smoothing) * x`.
    pub fn from_smoothing(smoothing: T) -> Self {
        Self {
            y: T::zero(),
            alpha0: T::one() - smoothing,
            alpha1: smoothing,
        }
    }

    pub fn set_smoothing(&mut self, smoothing: T) {
        self.alpha0 = T::one() - smoothing;
        self.alpha1 = smoothing;
    }

    /// Reset the filter output to `value`.
    pub fn reset(&mut self, value: T) {
        self.y = value;
    }

    pub fn value(&self) -> T {
        self.y
    }

    pub fn update(&mut self, x: T) -> T {
        self.y = self.alpha0 * x + self.alpha1 * self.y;
        self.y
    }
}

/// Running average of the time between consecutive calls, bounded to a
/// sensible range so that a stalled caller does not produce a huge step.
#[derive(Debug, Copy, Clone)]
pub struct DeltaTime {
    last: Option<Instant>,
    expected: f32,
    min: f32,
    max: f32,
    average: Lowpass<f32>,
}

impl DeltaTime {
    /// - `expected`: Nominal delta time, and the initial average [s]
    /// - `min`, `max`: Bounds applied to every measured delta time [s]
    /// - `alpha`: Weight of each new measurement in the average
    pub fn new(expected: f32, min: f32, max: f32, alpha: f32) -> Self {
        let mut average = Lowpass::from_smoothing(1.0 - alpha);
        average.reset(expected);
        Self {
            last: None,
            expected,
            min,
            max,
            average,
        }
    }

    /// Forget the previous timestamp and restart the average at the expected value.
    pub fn reset(&mut self) {
        self.last = None;
        self.average.reset(self.expected);
    }

    /// Register a call at `now` and return the averaged delta time in seconds.
    pub fn average_seconds(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).as_micros() as f32 * 1e-6,
            None => self.expected,
        };
        self.last = Some(now);
        self.average.update(dt.clamp(self.min, self.max))
    }
}
