use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Match result from the home side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_goals(home_goals: u32, away_goals: u32) -> Self {
        if home_goals > away_goals {
            Outcome::Home
        } else if home_goals < away_goals {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }
}

/// A 3-way outcome probability triple (home win / draw / away win).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn one_hot(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Self { home: 1.0, draw: 0.0, away: 0.0 },
            Outcome::Draw => Self { home: 0.0, draw: 1.0, away: 0.0 },
            Outcome::Away => Self { home: 0.0, draw: 0.0, away: 1.0 },
        }
    }

    /// Rescale so the three components sum to exactly 1.
    /// A degenerate (zero or non-finite) sum falls back to uniform.
    pub fn normalized(self) -> Self {
        let sum = self.home + self.draw + self.away;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::uniform();
        }
        Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        }
    }

    /// Most probable outcome. A draw wins exact ties, so an evenly split
    /// triple never picks a side arbitrarily.
    pub fn argmax(self) -> Outcome {
        if self.draw >= self.home && self.draw >= self.away {
            Outcome::Draw
        } else if self.home >= self.away {
            Outcome::Home
        } else {
            Outcome::Away
        }
    }

    pub fn get(self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Shannon entropy in nats. Zero-probability terms contribute nothing.
    pub fn entropy(self) -> f64 {
        [self.home, self.draw, self.away]
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum()
    }
}

/// Cooperative cancellation flag checked between Monte-Carlo trials.
/// Cloning is cheap; any clone can cancel the whole batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
