use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::types::{Outcome, Prob3};

/// Resolved predictions required before adjustment suggestions activate.
const MIN_SAMPLE: usize = 30;
/// Look-back window for adjustment suggestions, in days.
const ADJUSTMENT_WINDOW_DAYS: i64 = 90;
/// Resolved predictions counted by the recency accuracy figure.
const RECENT_WINDOW: usize = 50;

/// A stored prediction, optionally resolved against the real result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub match_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    pub outcome: Prob3,
    pub predicted_winner: Outcome,
    pub confidence: f64,
    pub home_xg: f64,
    pub away_xg: f64,
    pub predicted_scoreline: (u32, u32),
    pub home_elo: f64,
    pub away_elo: f64,
    pub weather_factor: f64,
    pub referee_factor: f64,

    pub actual_home_goals: Option<u32>,
    pub actual_away_goals: Option<u32>,
    pub actual_winner: Option<Outcome>,
    pub winner_correct: Option<bool>,
    pub scoreline_correct: Option<bool>,
    /// |rounded predicted total - actual total| goals.
    pub goals_error: Option<u32>,
}

impl PredictionRecord {
    pub fn is_resolved(&self) -> bool {
        self.actual_winner.is_some()
    }

    /// Squared-error (Brier) contribution against the one-hot actual
    /// outcome, in [0, 2]. None until resolved.
    pub fn brier(&self) -> Option<f64> {
        let actual = Prob3::one_hot(self.actual_winner?);
        let p = self.outcome;
        Some(
            (p.home - actual.home).powi(2)
                + (p.draw - actual.draw).powi(2)
                + (p.away - actual.away).powi(2),
        )
    }
}

/// Everything the caller supplies when storing a prediction; the winner and
/// scoreline are derived at storage time, not supplied.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub match_date: DateTime<Utc>,
    pub outcome: Prob3,
    pub confidence: f64,
    pub home_xg: f64,
    pub away_xg: f64,
    pub home_elo: f64,
    pub away_elo: f64,
    pub weather_factor: f64,
    pub referee_factor: f64,
}

impl Default for NewPrediction {
    fn default() -> Self {
        Self {
            match_id: String::new(),
            home_team: String::new(),
            away_team: String::new(),
            league: String::new(),
            match_date: Utc::now(),
            outcome: Prob3::uniform(),
            confidence: 0.0,
            home_xg: 1.35,
            away_xg: 1.35,
            home_elo: 1500.0,
            away_elo: 1500.0,
            weather_factor: 1.0,
            referee_factor: 1.0,
        }
    }
}

/// Accuracy counts per prediction-confidence band.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierAccuracy {
    pub count: usize,
    pub correct: usize,
}

impl TierAccuracy {
    pub fn accuracy(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.correct as f64 / self.count as f64
        }
    }
}

/// Aggregate accuracy over a set of resolved predictions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccuracyMetrics {
    pub total_predictions: usize,
    pub resolved: usize,
    pub winner_accuracy: f64,
    pub home_predicted: usize,
    pub home_correct: usize,
    pub draw_predicted: usize,
    pub draw_correct: usize,
    pub away_predicted: usize,
    pub away_correct: usize,
    pub exact_scoreline_rate: f64,
    pub avg_goals_error: f64,
    pub within_one_goal_rate: f64,
    /// Mean Brier score, in [0, 2]; lower is better.
    pub brier_score: f64,
    pub low_confidence: TierAccuracy,
    pub medium_confidence: TierAccuracy,
    pub high_confidence: TierAccuracy,
    /// Winner accuracy over the most recently played resolved predictions.
    pub recent_accuracy: f64,
}

/// Model corrections derived from tracked accuracy. Neutral values mean
/// "change nothing".
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelAdjustments {
    pub home_advantage_factor: f64,
    pub draw_bias: f64,
    pub goals_scale: f64,
}

impl Default for ModelAdjustments {
    fn default() -> Self {
        Self {
            home_advantage_factor: 1.0,
            draw_bias: 0.0,
            goals_scale: 1.0,
        }
    }
}

/// Per-league accuracy summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeaguePerformance {
    pub total: usize,
    pub resolved: usize,
    pub winner_accuracy: f64,
    pub avg_goals_error: f64,
}

/// Stores predictions, resolves them against real results, and reports how
/// well the model has been doing.
#[derive(Debug, Default)]
pub struct PredictionTracker {
    records: HashMap<String, PredictionRecord>,
}

impl PredictionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = PredictionRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.match_id.clone(), r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, match_id: &str) -> Option<&PredictionRecord> {
        self.records.get(match_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PredictionRecord> {
        self.records.values()
    }

    /// Store (or overwrite) the prediction for a match. The predicted winner
    /// is the argmax of the outcome triple and the predicted scoreline is the
    /// rounded expected goals, both frozen at storage time.
    pub fn store_prediction(&mut self, new: NewPrediction) -> &PredictionRecord {
        let record = PredictionRecord {
            predicted_winner: new.outcome.argmax(),
            predicted_scoreline: (
                new.home_xg.round() as u32,
                new.away_xg.round() as u32,
            ),
            match_id: new.match_id.clone(),
            home_team: new.home_team,
            away_team: new.away_team,
            league: new.league,
            match_date: new.match_date,
            created_at: Utc::now(),
            outcome: new.outcome,
            confidence: new.confidence,
            home_xg: new.home_xg,
            away_xg: new.away_xg,
            home_elo: new.home_elo,
            away_elo: new.away_elo,
            weather_factor: new.weather_factor,
            referee_factor: new.referee_factor,
            actual_home_goals: None,
            actual_away_goals: None,
            actual_winner: None,
            winner_correct: None,
            scoreline_correct: None,
            goals_error: None,
        };
        self.records.entry(new.match_id).insert_entry(record).into_mut()
    }

    /// Resolve a stored prediction against the final score. Re-recording
    /// overwrites the previous resolution; the last write wins.
    pub fn record_outcome(
        &mut self,
        match_id: &str,
        home_goals: u32,
        away_goals: u32,
    ) -> Result<&PredictionRecord> {
        let Some(record) = self.records.get_mut(match_id) else {
            return Err(EngineError::PredictionNotFound(match_id.to_string()));
        };

        let actual = Outcome::from_goals(home_goals, away_goals);
        let predicted_total = (record.home_xg + record.away_xg).round() as i64;
        let actual_total = (home_goals + away_goals) as i64;

        record.actual_home_goals = Some(home_goals);
        record.actual_away_goals = Some(away_goals);
        record.actual_winner = Some(actual);
        record.winner_correct = Some(record.predicted_winner == actual);
        record.scoreline_correct =
            Some(record.predicted_scoreline == (home_goals, away_goals));
        record.goals_error = Some((predicted_total - actual_total).unsigned_abs() as u32);

        info!(
            match_id,
            home_goals,
            away_goals,
            winner_correct = record.predicted_winner == actual,
            "prediction resolved"
        );
        Ok(record)
    }

    /// Most recently played predictions first, optionally filtered by league
    /// and resolution status.
    pub fn recent(
        &self,
        limit: usize,
        league: Option<&str>,
        resolved_only: bool,
    ) -> Vec<&PredictionRecord> {
        let mut selected: Vec<&PredictionRecord> = self
            .records
            .values()
            .filter(|r| league.is_none_or(|l| r.league.eq_ignore_ascii_case(l)))
            .filter(|r| !resolved_only || r.is_resolved())
            .collect();
        selected.sort_by(|a, b| {
            b.match_date
                .cmp(&a.match_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        selected.truncate(limit);
        selected
    }

    /// Accuracy over resolved predictions, optionally restricted to one
    /// league and/or the last `days` days of match dates.
    pub fn accuracy_metrics(&self, league: Option<&str>, days: Option<i64>) -> AccuracyMetrics {
        let cutoff = days.map(|d| Utc::now() - Duration::days(d));
        let total_predictions = self
            .records
            .values()
            .filter(|r| league.is_none_or(|l| r.league.eq_ignore_ascii_case(l)))
            .filter(|r| cutoff.is_none_or(|c| r.match_date >= c))
            .count();

        let mut resolved: Vec<&PredictionRecord> = self
            .records
            .values()
            .filter(|r| r.is_resolved())
            .filter(|r| league.is_none_or(|l| r.league.eq_ignore_ascii_case(l)))
            .filter(|r| cutoff.is_none_or(|c| r.match_date >= c))
            .collect();

        let mut metrics = AccuracyMetrics {
            total_predictions,
            resolved: resolved.len(),
            ..AccuracyMetrics::default()
        };
        if resolved.is_empty() {
            return metrics;
        }

        let mut winner_hits = 0usize;
        let mut scoreline_hits = 0usize;
        let mut goals_error_sum = 0u64;
        let mut within_one = 0usize;
        let mut brier_sum = 0.0;

        for record in &resolved {
            let hit = record.winner_correct == Some(true);
            if hit {
                winner_hits += 1;
            }
            if record.scoreline_correct == Some(true) {
                scoreline_hits += 1;
            }
            let error = record.goals_error.unwrap_or(0);
            goals_error_sum += error as u64;
            if error <= 1 {
                within_one += 1;
            }
            brier_sum += record.brier().unwrap_or(0.0);

            match record.predicted_winner {
                Outcome::Home => {
                    metrics.home_predicted += 1;
                    metrics.home_correct += hit as usize;
                }
                Outcome::Draw => {
                    metrics.draw_predicted += 1;
                    metrics.draw_correct += hit as usize;
                }
                Outcome::Away => {
                    metrics.away_predicted += 1;
                    metrics.away_correct += hit as usize;
                }
            }

            let tier = if record.confidence < 0.4 {
                &mut metrics.low_confidence
            } else if record.confidence < 0.7 {
                &mut metrics.medium_confidence
            } else {
                &mut metrics.high_confidence
            };
            tier.count += 1;
            tier.correct += hit as usize;
        }

        let n = resolved.len() as f64;
        metrics.winner_accuracy = winner_hits as f64 / n;
        metrics.exact_scoreline_rate = scoreline_hits as f64 / n;
        metrics.avg_goals_error = goals_error_sum as f64 / n;
        metrics.within_one_goal_rate = within_one as f64 / n;
        metrics.brier_score = brier_sum / n;

        resolved.sort_by(|a, b| b.match_date.cmp(&a.match_date));
        resolved.truncate(RECENT_WINDOW);
        let recent_hits = resolved
            .iter()
            .filter(|r| r.winner_correct == Some(true))
            .count();
        metrics.recent_accuracy = recent_hits as f64 / resolved.len() as f64;

        metrics
    }

    /// Suggested model corrections from the last 90 days of resolved
    /// predictions. Stays neutral until the sample is large enough to trust.
    pub fn suggest_adjustments(&self) -> ModelAdjustments {
        let metrics = self.accuracy_metrics(None, Some(ADJUSTMENT_WINDOW_DAYS));
        let mut adjustments = ModelAdjustments::default();
        if metrics.resolved < MIN_SAMPLE {
            return adjustments;
        }

        if metrics.home_predicted > 0 {
            let precision = metrics.home_correct as f64 / metrics.home_predicted as f64;
            if precision < 0.4 {
                adjustments.home_advantage_factor = 0.9;
            } else if precision > 0.6 {
                adjustments.home_advantage_factor = 1.1;
            }
        }

        if metrics.draw_predicted > 0 {
            let precision = metrics.draw_correct as f64 / metrics.draw_predicted as f64;
            if precision < 0.25 {
                adjustments.draw_bias = -0.02;
            } else if precision > 0.35 {
                adjustments.draw_bias = 0.02;
            }
        }

        if metrics.avg_goals_error > 1.5 {
            adjustments.goals_scale = 0.95;
        }

        adjustments
    }

    /// Accuracy summary broken down by league.
    pub fn league_performance(&self) -> HashMap<String, LeaguePerformance> {
        let mut leagues: HashMap<String, LeaguePerformance> = HashMap::new();
        for record in self.records.values() {
            let entry = leagues.entry(record.league.clone()).or_default();
            entry.total += 1;
            if record.is_resolved() {
                entry.resolved += 1;
                // Reuse the fields as running sums, fixed up below.
                entry.winner_accuracy += (record.winner_correct == Some(true)) as u32 as f64;
                entry.avg_goals_error += record.goals_error.unwrap_or(0) as f64;
            }
        }
        for perf in leagues.values_mut() {
            if perf.resolved > 0 {
                perf.winner_accuracy /= perf.resolved as f64;
                perf.avg_goals_error /= perf.resolved as f64;
            }
        }
        leagues
    }
}
