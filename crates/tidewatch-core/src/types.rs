use std::time::SystemTime;

/// A single traffic reading for one control-loop tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// Average requests per minute over the trailing window.
    pub value: f64,
    /// End of the window the value was computed over.
    pub window_end: SystemTime,
}

impl MetricSample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            window_end: SystemTime::now(),
        }
    }
}

/// Desired capacity of a group together with its bounds.
///
/// `min <= current <= max` holds for every value produced by this type:
/// construction and every mutation clamp into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityState {
    current: u32,
    min: u32,
    max: u32,
}

impl CapacityState {
    /// Build a capacity state, clamping `current` into `[min, max]`.
    ///
    /// If `min > max` the bounds are swapped.
    pub fn new(current: u32, min: u32, max: u32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            current: current.clamp(min, max),
            min,
            max,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn at_max(&self) -> bool {
        self.current >= self.max
    }

    pub fn at_min(&self) -> bool {
        self.current <= self.min
    }

    /// Return a copy with `current` set to `desired`, clamped to the bounds.
    pub fn with_desired(&self, desired: u32) -> Self {
        Self::new(desired, self.min, self.max)
    }
}
