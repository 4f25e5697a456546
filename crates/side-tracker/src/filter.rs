//! First-order low-pass filter

/// First-order IIR low-pass filter, seeded with the first sample
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    /// Smoothing factor derived from time constant and step
    alpha: f64,
    value: f64,
    initialized: bool,
}

impl LowPassFilter {
    /// Create a filter with time constant `rc` seconds sampled every `dt` seconds
    pub fn new(rc: f64, dt: f64) -> Self {
        let alpha = if rc + dt > 0.0 { dt / (rc + dt) } else { 1.0 };
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
            initialized: false,
        }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value += self.alpha * (sample - self.value);
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}
