use crate::threshold::is_breaching;
use adpulse_common::types::Sensitivity;
use std::collections::VecDeque;

/// The last `capacity` samples of a metric, oldest first.
pub struct SampleWindow {
    capacity: usize,
    data: VecDeque<f64>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
        }
    }

    /// Builds the window from historical samples (oldest first) followed by
    /// the current sample.
    pub fn from_history(history: &[f64], current: f64, capacity: usize) -> Self {
        let mut window = Self::new(capacity);
        for value in history {
            window.push(*value);
        }
        window.push(current);
        window
    }

    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.data.push_back(value);
        while self.data.len() > self.capacity {
            self.data.pop_front();
        }
    }

    /// Breach flag of every sample against `expected`, oldest first.
    pub fn breach_pattern(&self, expected: f64, sensitivity: Sensitivity) -> Vec<bool> {
        self.data
            .iter()
            .map(|v| is_breaching(*v, expected, sensitivity))
            .collect()
    }

    pub fn breach_count(&self, expected: f64, sensitivity: Sensitivity) -> u32 {
        self.data
            .iter()
            .filter(|v| is_breaching(**v, expected, sensitivity))
            .count() as u32
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
