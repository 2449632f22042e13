//! Named, bounded integer parameters with a monotonic step.

use crate::error::{TuneResult, TuningError};
use std::fmt;

/// How a parameter moves to its next legal value.
#[derive(Clone, Copy)]
pub enum StepFn {
    MulByTwo,
    AddOne,
    Custom(fn(usize) -> usize),
}

impl StepFn {
    pub fn apply(&self, value: usize) -> usize {
        match self {
            StepFn::MulByTwo => value.saturating_mul(2),
            StepFn::AddOne => value.saturating_add(1),
            StepFn::Custom(step) => step(value),
        }
    }
}

impl fmt::Debug for StepFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFn::MulByTwo => f.write_str("MulByTwo"),
            StepFn::AddOne => f.write_str("AddOne"),
            StepFn::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TuningParam {
    name: String,
    current: usize,
    min: usize,
    max: usize,
    step: StepFn,
}

impl TuningParam {
    pub fn new(name: impl Into<String>, min: usize, max: usize, step: StepFn) -> TuneResult<Self> {
        let name = name.into();
        if min > max {
            return Err(TuningError::invalid(name, format!("min {min} exceeds max {max}")));
        }
        if min < max && step.apply(min) <= min {
            return Err(TuningError::invalid(
                name,
                format!("step does not increase the value at {min}"),
            ));
        }
        Ok(Self {
            name,
            current: min,
            min,
            max,
            step,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> usize {
        self.current
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Moves to the next legal value; wraps back to `min` and returns `false`
    /// once the range is exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.step.apply(self.current);
        if self.current == self.max || next <= self.current || next > self.max {
            self.current = self.min;
            false
        } else {
            self.current = next;
            true
        }
    }

    /// Every legal value in ascending order.
    pub fn values(&self) -> Vec<usize> {
        let mut cursor = self.clone();
        cursor.reset();
        let mut values = vec![cursor.value()];
        while cursor.advance() {
            values.push(cursor.value());
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_range() {
        let param = TuningParam::new("ms", 2, 16, StepFn::MulByTwo).expect("param");
        assert_eq!(param.values(), vec![2, 4, 8, 16]);
    }

    #[test]
    fn degenerate_range_has_a_single_value() {
        let param = TuningParam::new("unroll", 1, 1, StepFn::AddOne).expect("param");
        assert_eq!(param.values(), vec![1]);
        let zero = TuningParam::new("rhs_storage", 0, 0, StepFn::MulByTwo).expect("param");
        assert_eq!(zero.values(), vec![0]);
        let doubling = TuningParam::new("vector", 1, 1, StepFn::MulByTwo).expect("param");
        assert_eq!(doubling.values(), vec![1]);
    }

    #[test]
    fn single_point_range_never_steps() {
        let stalled = TuningParam::new("ks", 8, 8, StepFn::Custom(|v| v)).expect("stalled");
        assert_eq!(stalled.values(), vec![8]);
        let shrinking =
            TuningParam::new("ks", 5, 5, StepFn::Custom(|v| v.saturating_sub(1))).expect("shrinking");
        assert_eq!(shrinking.values(), vec![5]);

        let mut param = stalled.clone();
        assert!(!param.advance());
        assert_eq!(param.value(), 8);
    }

    #[test]
    fn max_need_not_be_reachable() {
        let param = TuningParam::new("kl", 3, 20, StepFn::MulByTwo).expect("param");
        assert_eq!(param.values(), vec![3, 6, 12]);
    }

    #[test]
    fn custom_step() {
        let param = TuningParam::new("n", 1, 30, StepFn::Custom(|v| v * 3 + 1)).expect("param");
        assert_eq!(param.values(), vec![1, 4, 13]);
    }

    #[test]
    fn rejects_bad_bounds_and_stalled_steps() {
        assert!(matches!(
            TuningParam::new("ml", 32, 16, StepFn::MulByTwo),
            Err(TuningError::InvalidParameter { .. })
        ));
        assert!(TuningParam::new("ml", 0, 16, StepFn::MulByTwo).is_err());
        assert!(TuningParam::new("ml", 4, 16, StepFn::Custom(|v| v)).is_err());
    }
}
