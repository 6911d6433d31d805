use crate::clock::Clock;
use crate::model::{Metrics, SaveRecord, Vitals, VitalsDelta};
use chrono::{DateTime, Utc};
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Real minutes it takes each vital to lose one point.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DecayRates {
    pub(crate) hunger: f64,
    pub(crate) happiness: f64,
    pub(crate) energy: f64,
    pub(crate) health: f64,
    pub(crate) love: f64,
}

pub(crate) const DECAY: DecayRates = DecayRates {
    hunger: 5.0,
    happiness: 5.0,
    energy: 15.0,
    health: 30.0,
    love: 30.0,
};

/// One simulated day per 24 real minutes.
pub(crate) const MINUTES_PER_DAY: f64 = 24.0;

#[derive(Clone, Debug)]
pub(crate) struct CatchupSummary {
    pub(crate) minutes: f64,
    pub(crate) before: Metrics,
    pub(crate) after: Metrics,
}

impl CatchupSummary {
    pub(crate) fn has_anything(&self) -> bool {
        self.minutes >= 1.0
    }
}

pub(crate) struct VitalsModel {
    vitals: Vitals,
    age: f64,
    last_tick: DateTime<Utc>,
    clock: Rc<dyn Clock>,
    subscribers: Vec<mpsc::UnboundedSender<Metrics>>,
}

impl VitalsModel {
    pub(crate) fn new(clock: Rc<dyn Clock>) -> Self {
        Self::restore(SaveRecord::default(), clock)
    }

    pub(crate) fn restore(record: SaveRecord, clock: Rc<dyn Clock>) -> Self {
        let last_tick = record.last_tick.unwrap_or_else(|| clock.now());
        let age = if record.age.is_finite() {
            record.age.max(0.0)
        } else {
            0.0
        };
        Self {
            vitals: record.vitals(),
            age,
            last_tick,
            clock,
            subscribers: Vec::new(),
        }
    }

    /// Metrics-changed notifications, delivered in mutation order.
    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Metrics> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn tick(&mut self, elapsed_minutes: f64) {
        let m = if elapsed_minutes.is_finite() {
            elapsed_minutes.max(0.0)
        } else {
            0.0
        };

        let v = self.vitals;
        self.vitals = Vitals {
            hunger: v.hunger - m / DECAY.hunger,
            happiness: v.happiness - m / DECAY.happiness,
            energy: v.energy - m / DECAY.energy,
            health: v.health - m / DECAY.health,
            love: v.love - m / DECAY.love,
        }
        .clamped();
        self.age += m / MINUTES_PER_DAY;

        self.emit();
    }

    /// Decays by the wall-clock time since the previous tick and returns the
    /// minutes applied. A clock that went backwards counts as zero elapsed.
    pub(crate) fn tick_now(&mut self) -> f64 {
        let now = self.clock.now();
        let elapsed = (now - self.last_tick).num_milliseconds() as f64 / 60_000.0;
        let elapsed = elapsed.max(0.0);
        self.tick(elapsed);
        self.last_tick = now;
        elapsed
    }

    /// Applies whatever time passed while the app was closed in one step.
    pub(crate) fn catch_up(&mut self) -> CatchupSummary {
        let before = self.snapshot();
        let minutes = self.tick_now();
        let after = self.snapshot();
        let summary = CatchupSummary {
            minutes,
            before,
            after,
        };
        if summary.has_anything() {
            info!(
                minutes,
                hunger = after.hunger,
                happiness = after.happiness,
                age_days = self.age(),
                "caught up on time spent away"
            );
        }
        summary
    }

    pub(crate) fn apply_action(&mut self, delta: &VitalsDelta) {
        self.vitals = self.vitals.apply(delta);
        self.emit();
    }

    pub(crate) fn snapshot(&self) -> Metrics {
        Metrics::from_vitals(&self.vitals, self.age)
    }

    pub(crate) fn vitals(&self) -> Vitals {
        self.vitals
    }

    pub(crate) fn age(&self) -> f64 {
        self.age
    }

    pub(crate) fn record(&self) -> SaveRecord {
        SaveRecord::from_parts(&self.vitals, self.age, Some(self.last_tick))
    }

    fn emit(&mut self) {
        let metrics = self.snapshot();
        self.subscribers.retain(|tx| tx.send(metrics).is_ok());
        debug!(
            hunger = metrics.hunger,
            happiness = metrics.happiness,
            energy = metrics.energy,
            health = metrics.health,
            love = metrics.love,
            emotion = %metrics.emotion,
            "metrics changed"
        );
    }
}
