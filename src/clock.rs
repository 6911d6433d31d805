use chrono::{DateTime, Utc};

/// Wall-clock source for the vitals model. Decay is measured against this,
/// so tests swap in a [`ManualClock`] and step it by hand.
pub(crate) trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
