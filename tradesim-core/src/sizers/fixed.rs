//! Fixed Position Sizer
//!
//! Base (or explicit) size, escalated while the win rate is high.

use crate::sizers::{Sizer, SizingInput, SizingRules};

#[derive(Debug, Clone)]
pub struct FixedSizer {
    rules: SizingRules,
}

impl FixedSizer {
    pub fn new(rules: SizingRules) -> Self {
        Self { rules }
    }
}

impl Sizer for FixedSizer {
    fn size(&self, input: &SizingInput) -> f64 {
        let computed = self.rules.starting_size(input)
            * self.rules.escalation(input.rolling_win_rate)
            * input.risk_adjustment;
        self.rules.finish(computed, input)
    }

    fn name(&self) -> &str {
        "Fixed"
    }
}
