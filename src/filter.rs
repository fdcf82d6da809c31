//! change filter: decides which readings are worth a live push.
//!
//! the auto-pilot always sees the freshest raw reading; this only throttles
//! what goes out to observers.

use crate::domain::Reading;

/// relative change (percent) a value must exceed to count as significant
pub const SIGNIFICANT_CHANGE_PCT: f32 = 2.0;

const ZERO_EPSILON: f32 = 1e-6;

#[derive(Debug, Default)]
pub struct ChangeFilter {
    baseline: Option<Reading>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// last reading that was let through
    pub fn baseline(&self) -> Option<&Reading> {
        self.baseline.as_ref()
    }

    /// returns true (and advances the baseline) when `current` differs enough
    /// from the last published reading
    pub fn admit(&mut self, current: &Reading) -> bool {
        let significant = match &self.baseline {
            None => true,
            Some(prev) => {
                changed(prev.luminosity, current.luminosity)
                    || prev.humidity != current.humidity
                    || changed(prev.temperature, current.temperature)
            }
        };
        if significant {
            self.baseline = Some(current.clone());
        }
        significant
    }
}

fn changed(previous: f32, current: f32) -> bool {
    if previous.abs() < ZERO_EPSILON {
        return current.abs() > ZERO_EPSILON;
    }
    (current - previous).abs() / previous.abs() * 100.0 > SIGNIFICANT_CHANGE_PCT
}
