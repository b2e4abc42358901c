//! Step planning over the modelling horizon.
//!
//! A run is split into sequential steps. Each step is authoritative for its
//! `actual_years` and shows the optimizer a longer `modelled_years` window so
//! investment decisions near the end of a step still see the following years.

use serde::{Deserialize, Serialize};

use crate::error::{StepError, StepResult};

/// Ordered, strictly increasing list of modelled years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    years: Vec<i32>,
}

impl Horizon {
    pub fn new(years: Vec<i32>) -> StepResult<Self> {
        if years.is_empty() {
            return Err(StepError::config("horizon contains no years"));
        }
        if let Some(pair) = years.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(StepError::config(format!(
                "horizon years must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { years })
    }

    /// Build a horizon from unordered year values, dropping duplicates.
    pub fn from_unsorted(mut years: Vec<i32>) -> StepResult<Self> {
        years.sort_unstable();
        years.dedup();
        Self::new(years)
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn first(&self) -> i32 {
        self.years[0]
    }

    pub fn last(&self) -> i32 {
        self.years[self.years.len() - 1]
    }
}

/// Step-size policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLength {
    /// Every step covers the same number of years.
    Uniform(usize),
    /// The first step has its own length, all later steps share `rest`.
    TwoPhase { first: usize, rest: usize },
}

impl StepLength {
    /// Parse the one- or two-value form accepted on the command line.
    pub fn from_sizes(sizes: &[i64]) -> StepResult<Self> {
        let checked = |size: i64| -> StepResult<usize> {
            if size <= 0 {
                Err(StepError::config(format!(
                    "step length must be positive, got {size}"
                )))
            } else {
                Ok(size as usize)
            }
        };
        match sizes {
            [] => Err(StepError::config("at least one step length is required")),
            [size] => Ok(StepLength::Uniform(checked(*size)?)),
            [first, rest] => Ok(StepLength::TwoPhase {
                first: checked(*first)?,
                rest: checked(*rest)?,
            }),
            more => Err(StepError::config(format!(
                "at most two step lengths may be given, got {}",
                more.len()
            ))),
        }
    }

    /// Length of step `index`.
    pub fn size_of(&self, index: usize) -> usize {
        match *self {
            StepLength::Uniform(size) => size,
            StepLength::TwoPhase { first, rest } => {
                if index == 0 {
                    first
                } else {
                    rest
                }
            }
        }
    }

    /// Number of steps needed to cover `horizon_len` years.
    ///
    /// `ceil(n / size)` for uniform steps and `ceil(1 + (n - first) / rest)`
    /// for two-phase steps (one step when the first step already covers the
    /// whole horizon).
    pub fn step_count(&self, horizon_len: usize) -> usize {
        match *self {
            StepLength::Uniform(size) => horizon_len.div_ceil(size),
            StepLength::TwoPhase { first, rest } => {
                if horizon_len <= first {
                    1
                } else {
                    1 + (horizon_len - first).div_ceil(rest)
                }
            }
        }
    }
}

/// One slice of the horizon solved as a single optimization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    /// Years this step is authoritative for.
    pub actual_years: Vec<i32>,
    /// Actual years plus the foresight tail.
    pub modelled_years: Vec<i32>,
}

impl Step {
    pub fn is_modelled(&self, year: i32) -> bool {
        self.modelled_years.contains(&year)
    }

    /// Last year before this step's window; change rules grow from here.
    pub fn base_year(&self) -> i32 {
        self.modelled_years[0] - 1
    }
}

/// Split the horizon into steps.
///
/// **Algorithm:** a cursor walks the horizon by position. Step `i` takes the
/// next `size_of(i)` years as its actual years (the final step takes whatever
/// is left). Its modelled window starts at the same position and spans
/// `2 × size` years by default, or `size + foresight` years when foresight is
/// given, clipped to the end of the horizon. The final step models exactly its
/// actual years.
pub fn plan_steps(
    horizon: &Horizon,
    length: StepLength,
    foresight: Option<usize>,
) -> StepResult<Vec<Step>> {
    let years = horizon.years();
    let total = years.len();
    let count = length.step_count(total);
    let mut steps = Vec::with_capacity(count);
    let mut cursor = 0usize;

    for index in 0..count {
        let size = length.size_of(index);
        let actual_end = (cursor + size).min(total);
        let is_final = index + 1 == count;
        let modelled_end = if is_final {
            actual_end
        } else {
            let window = match foresight {
                Some(extra) => size + extra,
                None => size * 2,
            };
            (cursor + window).min(total)
        };

        steps.push(Step {
            index,
            actual_years: years[cursor..actual_end].to_vec(),
            modelled_years: years[cursor..modelled_end].to_vec(),
        });
        cursor = actual_end;
    }

    if cursor != total {
        return Err(StepError::Other(format!(
            "step plan covers {cursor} of {total} horizon years"
        )));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizon(start: i32, end: i32) -> Horizon {
        Horizon::new((start..=end).collect()).unwrap()
    }

    fn assert_partition(steps: &[Step], horizon: &Horizon) {
        let mut covered: Vec<i32> = steps
            .iter()
            .flat_map(|s| s.actual_years.iter().copied())
            .collect();
        let len = covered.len();
        covered.dedup();
        assert_eq!(covered.len(), len, "actual years overlap");
        assert_eq!(covered, horizon.years());
        for step in steps {
            for year in &step.actual_years {
                assert!(step.modelled_years.contains(year));
            }
        }
    }

    #[test]
    fn uniform_steps_partition_horizon() {
        let h = horizon(1990, 2010);
        for size in 1..=25 {
            let steps = plan_steps(&h, StepLength::Uniform(size), None).unwrap();
            assert_eq!(steps.len(), h.len().div_ceil(size));
            assert_partition(&steps, &h);
        }
    }

    #[test]
    fn two_phase_steps_partition_horizon() {
        let h = horizon(1990, 2010);
        for first in 1..=8 {
            for rest in 1..=8 {
                let length = StepLength::TwoPhase { first, rest };
                let steps = plan_steps(&h, length, Some(3)).unwrap();
                assert_partition(&steps, &h);
                assert_eq!(steps[0].actual_years.len(), first.min(h.len()));
            }
        }
    }

    #[test]
    fn default_lookahead_doubles_step() {
        let h = horizon(1990, 2009);
        let steps = plan_steps(&h, StepLength::Uniform(5), None).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].actual_years, (1990..=1994).collect::<Vec<_>>());
        assert_eq!(steps[0].modelled_years, (1990..=1999).collect::<Vec<_>>());
        assert_eq!(steps[2].modelled_years, (2000..=2009).collect::<Vec<_>>());
        assert_eq!(steps[3].modelled_years, steps[3].actual_years);
    }

    #[test]
    fn foresight_extends_window_and_clips() {
        let h = horizon(1990, 2001);
        let steps = plan_steps(&h, StepLength::Uniform(5), Some(2)).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].modelled_years, (1990..=1996).collect::<Vec<_>>());
        assert_eq!(steps[1].modelled_years, (1995..=2001).collect::<Vec<_>>());
        assert_eq!(steps[2].actual_years, vec![2000, 2001]);
        assert_eq!(steps[1].base_year(), 1994);
    }

    #[test]
    fn last_step_may_be_short() {
        let h = horizon(1990, 1996);
        let steps = plan_steps(&h, StepLength::TwoPhase { first: 1, rest: 4 }, None).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].actual_years, vec![1990]);
        assert_eq!(steps[0].modelled_years, vec![1990, 1991]);
        assert_eq!(steps[1].actual_years, vec![1991, 1992, 1993, 1994]);
        assert_eq!(steps[2].actual_years, vec![1995, 1996]);
    }

    #[test]
    fn invalid_step_lengths_are_configuration_errors() {
        assert!(matches!(
            StepLength::from_sizes(&[0]),
            Err(StepError::Configuration(_))
        ));
        assert!(matches!(
            StepLength::from_sizes(&[5, -1]),
            Err(StepError::Configuration(_))
        ));
        assert!(matches!(
            StepLength::from_sizes(&[1, 2, 3]),
            Err(StepError::Configuration(_))
        ));
        assert_eq!(
            StepLength::from_sizes(&[1, 5]).unwrap(),
            StepLength::TwoPhase { first: 1, rest: 5 }
        );
    }

    #[test]
    fn step_length_serializes_in_snake_case() {
        let json = serde_json::to_string(&StepLength::TwoPhase { first: 1, rest: 5 }).unwrap();
        assert_eq!(json, r#"{"two_phase":{"first":1,"rest":5}}"#);
    }

    #[test]
    fn horizon_rejects_unordered_years() {
        assert!(Horizon::new(vec![1990, 1990]).is_err());
        assert!(Horizon::new(vec![]).is_err());
        let h = Horizon::from_unsorted(vec![1992, 1990, 1991, 1990]).unwrap();
        assert_eq!(h.years(), &[1990, 1991, 1992]);
    }
}
