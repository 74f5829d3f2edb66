//! Recurrence arithmetic for task masters.
//!
//! A master's occurrences form a series anchored at its start date:
//! occurrence `k` is `anchor + k * step`. Each occurrence is computed from the
//! anchor rather than from the previous one, so a monthly series anchored on
//! the 31st returns to the 31st after passing through shorter months.

use chrono::{Days, Months, NaiveDate};

use crate::errors::ValidationError;
use crate::fields::{Frequency, FrequencyUnit};

/// Distance between two consecutive occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Days(u32),
    Months(u32),
}

/// A validated recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub step: Step,
    /// Calendar frequencies fire on the anchor itself; custom intervals first
    /// fire one full interval after it.
    pub fires_on_anchor: bool,
}

impl Recurrence {
    /// Build a rule from the wire fields of a task master.
    ///
    /// `value` and `unit` are only consulted for `Frequency::Custom`, where both
    /// are required and `value` must be at least 1.
    pub fn from_parts(
        frequency: Frequency,
        value: Option<u32>,
        unit: Option<FrequencyUnit>,
    ) -> Result<Self, ValidationError> {
        let calendar = |step| Ok(Recurrence { step, fires_on_anchor: true });
        match frequency {
            Frequency::Daily => calendar(Step::Days(1)),
            Frequency::Weekly => calendar(Step::Days(7)),
            Frequency::Monthly => calendar(Step::Months(1)),
            Frequency::Quarterly => calendar(Step::Months(3)),
            Frequency::Yearly => calendar(Step::Months(12)),
            Frequency::Custom => match (value, unit) {
                (Some(value), Some(unit)) if value >= 1 => {
                    let step = match unit {
                        FrequencyUnit::Days => Step::Days(value),
                        FrequencyUnit::Weeks => Step::Days(value.saturating_mul(7)),
                        FrequencyUnit::Months => Step::Months(value),
                    };
                    Ok(Recurrence { step, fires_on_anchor: false })
                }
                _ => {
                    let mut err = ValidationError::new();
                    match value {
                        None => err.push("frequencyValue", "is required for custom frequency"),
                        Some(0) => err.push("frequencyValue", "must be at least 1"),
                        Some(_) => {}
                    }
                    if unit.is_none() {
                        err.push("frequencyUnit", "is required for custom frequency");
                    }
                    Err(err)
                }
            },
        }
    }

    fn first_index(&self) -> u32 {
        if self.fires_on_anchor { 0 } else { 1 }
    }

    /// The `k`-th point of the series, or `None` past the representable range.
    pub fn nth(&self, anchor: NaiveDate, k: u32) -> Option<NaiveDate> {
        match self.step {
            Step::Days(d) => anchor.checked_add_days(Days::new(u64::from(k) * u64::from(d))),
            Step::Months(m) => anchor.checked_add_months(Months::new(k.checked_mul(m)?)),
        }
    }

    /// Index of the first occurrence strictly after `after`.
    fn first_index_after(&self, anchor: NaiveDate, after: Option<NaiveDate>) -> u32 {
        let base = self.first_index();
        let Some(after) = after else { return base };
        if after < anchor {
            return base;
        }
        let mut k = match self.step {
            Step::Days(d) => {
                let elapsed = (after - anchor).num_days().max(0) as u64;
                u32::try_from(elapsed / u64::from(d.max(1))).unwrap_or(u32::MAX)
            }
            Step::Months(_) => 0,
        };
        k = k.max(base);
        while let Some(date) = self.nth(anchor, k) {
            if date > after {
                break;
            }
            k = match k.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        k
    }

    /// Iterate the occurrences after `last` (all of them when `None`).
    pub fn occurrences_after(&self, anchor: NaiveDate, last: Option<NaiveDate>) -> Occurrences {
        Occurrences {
            rule: *self,
            anchor,
            k: Some(self.first_index_after(anchor, last)),
        }
    }

    /// The next occurrence after `last`.
    pub fn next_after(&self, anchor: NaiveDate, last: Option<NaiveDate>) -> Option<NaiveDate> {
        self.occurrences_after(anchor, last).next()
    }

    /// Occurrences in `(last, today]`, oldest first.
    pub fn due_through(&self, anchor: NaiveDate, last: Option<NaiveDate>, today: NaiveDate) -> Vec<NaiveDate> {
        self.occurrences_after(anchor, last)
            .take_while(|d| *d <= today)
            .collect()
    }
}

/// Iterator over a recurrence series.
#[derive(Debug, Clone)]
pub struct Occurrences {
    rule: Recurrence,
    anchor: NaiveDate,
    k: Option<u32>,
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let k = self.k?;
        let date = self.rule.nth(self.anchor, k);
        self.k = if date.is_some() { k.checked_add(1) } else { None };
        date
    }
}
