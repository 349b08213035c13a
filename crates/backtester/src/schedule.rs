use chrono::{Datelike, NaiveDate};
use configuration::RebalanceFrequency;

/// Decides on which simulated periods the portfolio is rebalanced.
///
/// The first simulated period always rebalances: it is the initial allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceSchedule {
    frequency: RebalanceFrequency,
}

impl RebalanceSchedule {
    pub fn new(frequency: RebalanceFrequency) -> Self {
        Self { frequency }
    }

    pub fn frequency(&self) -> &RebalanceFrequency {
        &self.frequency
    }

    /// One flag per entry of `dates` (the simulated periods, in order).
    pub fn flags(&self, dates: &[NaiveDate]) -> Vec<bool> {
        let mut flags = vec![false; dates.len()];
        if let Some(first) = flags.first_mut() {
            *first = true;
        }

        match &self.frequency {
            RebalanceFrequency::Never => {}
            RebalanceFrequency::EveryPeriods(n) => {
                let n = (*n).max(1);
                for (k, flag) in flags.iter_mut().enumerate() {
                    if k % n == 0 {
                        *flag = true;
                    }
                }
            }
            RebalanceFrequency::Weekly => mark_boundaries(&mut flags, dates, |d| {
                let week = d.iso_week();
                (week.year(), week.week())
            }),
            RebalanceFrequency::Monthly => mark_boundaries(&mut flags, dates, |d| (d.year(), d.month())),
            RebalanceFrequency::Quarterly => {
                mark_boundaries(&mut flags, dates, |d| (d.year(), (d.month() - 1) / 3))
            }
            RebalanceFrequency::Yearly => mark_boundaries(&mut flags, dates, |d| (d.year(), 0)),
            RebalanceFrequency::Dates(requested) => {
                let mut requested = requested.clone();
                requested.sort_unstable();
                for date in requested {
                    // First simulated period on or after the requested date.
                    let k = dates.partition_point(|d| *d < date);
                    if k < flags.len() {
                        flags[k] = true;
                    }
                }
            }
        }
        flags
    }
}

/// Flags every period whose calendar bucket differs from the previous period's.
fn mark_boundaries<F>(flags: &mut [bool], dates: &[NaiveDate], bucket: F)
where
    F: Fn(&NaiveDate) -> (i32, u32),
{
    for k in 1..dates.len() {
        if bucket(&dates[k]) != bucket(&dates[k - 1]) {
            flags[k] = true;
        }
    }
}
