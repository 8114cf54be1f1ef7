use serde::Serialize;

use crate::types::Prob3;

pub const DEFAULT_MAX_GOALS: u32 = 10;

/// Truncated Poisson distribution over goal counts 0..=max_goals,
/// renormalized so the probabilities sum to 1.
#[derive(Debug, Clone)]
pub struct GoalDistribution {
    pub lambda: f64,
    pub probs: Vec<f64>,
}

impl GoalDistribution {
    pub fn prob(&self, goals: u32) -> f64 {
        self.probs.get(goals as usize).copied().unwrap_or(0.0)
    }
}

/// A scoreline with its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scoreline {
    pub home: u32,
    pub away: u32,
    pub probability: f64,
}

/// Joint probability table over all (home goals, away goals) pairs up to the
/// cutoff. Home and away goals are treated as independent; this is a
/// deliberate simplification, not a bivariate-Poisson correlation model.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    cells: Vec<f64>, // row-major, (max_goals+1)^2
    pub home_lambda: f64,
    pub away_lambda: f64,
    pub max_goals: u32,
}

impl ScoreMatrix {
    pub fn prob(&self, home: u32, away: u32) -> f64 {
        if home > self.max_goals || away > self.max_goals {
            return 0.0;
        }
        let side = (self.max_goals + 1) as usize;
        self.cells[home as usize * side + away as usize]
    }

    pub fn home_win_prob(&self) -> f64 {
        self.sum_cells(|h, a| h > a)
    }

    pub fn draw_prob(&self) -> f64 {
        self.sum_cells(|h, a| h == a)
    }

    pub fn away_win_prob(&self) -> f64 {
        self.sum_cells(|h, a| h < a)
    }

    /// Probability that total goals exceed the threshold (e.g. 2.5).
    pub fn over_prob(&self, threshold: f64) -> f64 {
        self.sum_cells(|h, a| (h + a) as f64 > threshold)
    }

    pub fn btts_prob(&self) -> f64 {
        self.sum_cells(|h, a| h > 0 && a > 0)
    }

    /// The `n` most likely scorelines, probability descending; ties go to
    /// the lower-scoring game first.
    pub fn top_scorelines(&self, n: usize) -> Vec<Scoreline> {
        let mut all: Vec<Scoreline> = Vec::with_capacity(self.cells.len());
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                all.push(Scoreline { home: h, away: a, probability: self.prob(h, a) });
            }
        }
        all.sort_by(|x, y| {
            y.probability
                .total_cmp(&x.probability)
                .then((x.home + x.away).cmp(&(y.home + y.away)))
        });
        all.truncate(n);
        all
    }

    /// Per-goal-count home distribution recovered from the joint table.
    pub fn home_marginal(&self) -> Vec<f64> {
        (0..=self.max_goals)
            .map(|h| (0..=self.max_goals).map(|a| self.prob(h, a)).sum())
            .collect()
    }

    pub fn away_marginal(&self) -> Vec<f64> {
        (0..=self.max_goals)
            .map(|a| (0..=self.max_goals).map(|h| self.prob(h, a)).sum())
            .collect()
    }

    fn sum_cells(&self, include: impl Fn(u32, u32) -> bool) -> f64 {
        let mut total = 0.0;
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                if include(h, a) {
                    total += self.prob(h, a);
                }
            }
        }
        total
    }
}

/// Full prediction bundle for one match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchPrediction {
    pub outcome: Prob3,
    pub home_xg: f64,
    pub away_xg: f64,
    pub total_xg: f64,
    pub over_1_5: f64,
    pub over_2_5: f64,
    pub over_3_5: f64,
    pub btts: f64,
    pub scorelines: Vec<Scoreline>,
}

/// Poisson scoreline engine.
#[derive(Debug, Clone, Copy)]
pub struct PoissonModel {
    pub max_goals: u32,
}

impl Default for PoissonModel {
    fn default() -> Self {
        Self { max_goals: DEFAULT_MAX_GOALS }
    }
}

impl PoissonModel {
    pub fn new(max_goals: u32) -> Self {
        Self { max_goals }
    }

    /// Expected goals from strength multipliers, clamped so the Poisson
    /// model never degenerates.
    pub fn expected_goals(
        &self,
        attack_strength: f64,
        defense_weakness: f64,
        league_avg_goals: f64,
        home_advantage: f64,
    ) -> f64 {
        let xg = attack_strength * defense_weakness * league_avg_goals + home_advantage;
        xg.clamp(0.3, 5.0)
    }

    pub fn distribution(&self, lambda: f64) -> GoalDistribution {
        let lambda = lambda.max(0.0);
        let mut probs = vec![0.0; self.max_goals as usize + 1];
        // Iterative pmf avoids factorials: p(k) = p(k-1) * lambda / k.
        probs[0] = (-lambda).exp();
        for k in 1..probs.len() {
            probs[k] = probs[k - 1] * lambda / k as f64;
        }
        let sum: f64 = probs.iter().sum();
        if sum > 0.0 {
            for p in &mut probs {
                *p /= sum;
            }
        }
        GoalDistribution { lambda, probs }
    }

    pub fn matrix(&self, home_lambda: f64, away_lambda: f64) -> ScoreMatrix {
        let home = self.distribution(home_lambda);
        let away = self.distribution(away_lambda);
        let side = self.max_goals as usize + 1;
        let mut cells = vec![0.0; side * side];
        for h in 0..side {
            for a in 0..side {
                cells[h * side + a] = home.probs[h] * away.probs[a];
            }
        }
        ScoreMatrix {
            cells,
            home_lambda,
            away_lambda,
            max_goals: self.max_goals,
        }
    }

    /// Complete match prediction from attack/defense strength multipliers.
    /// The away side gets no home-advantage goal bonus.
    pub fn predict_match(
        &self,
        home_attack: f64,
        home_defense: f64,
        away_attack: f64,
        away_defense: f64,
        league_avg_goals: f64,
        home_advantage: f64,
    ) -> MatchPrediction {
        let home_xg = self.expected_goals(
            home_attack,
            defense_weakness(away_defense),
            league_avg_goals,
            home_advantage,
        );
        let away_xg = self.expected_goals(
            away_attack,
            defense_weakness(home_defense),
            league_avg_goals,
            0.0,
        );

        let matrix = self.matrix(home_xg, away_xg);
        let outcome = Prob3 {
            home: matrix.home_win_prob(),
            draw: matrix.draw_prob(),
            away: matrix.away_win_prob(),
        }
        .normalized();

        MatchPrediction {
            outcome,
            home_xg,
            away_xg,
            total_xg: home_xg + away_xg,
            over_1_5: matrix.over_prob(1.5),
            over_2_5: matrix.over_prob(2.5),
            over_3_5: matrix.over_prob(3.5),
            btts: matrix.btts_prob(),
            scorelines: matrix.top_scorelines(5),
        }
    }
}

// A stronger defense means a weaker scoring opportunity for the opponent.
fn defense_weakness(defense_strength: f64) -> f64 {
    if defense_strength > 0.0 {
        1.0 / defense_strength
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_sums_to_one() {
        let model = PoissonModel::default();
        for lambda in [0.3, 1.35, 2.8, 5.0] {
            let dist = model.distribution(lambda);
            let sum: f64 = dist.probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "lambda {lambda}: sum {sum}");
        }
    }

    #[test]
    fn distribution_mode_tracks_lambda() {
        let model = PoissonModel::default();
        let dist = model.distribution(2.0);
        // Poisson mode for integer lambda is lambda-1 and lambda, equal mass.
        assert!((dist.prob(1) - dist.prob(2)).abs() < 1e-9);
        assert!(dist.prob(2) > dist.prob(4));
    }

    #[test]
    fn matrix_cells_sum_to_one() {
        let model = PoissonModel::default();
        let matrix = model.matrix(1.6, 1.1);
        let total = matrix.home_win_prob() + matrix.draw_prob() + matrix.away_win_prob();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn marginals_round_trip_to_inputs() {
        let model = PoissonModel::default();
        let home = model.distribution(1.9);
        let away = model.distribution(0.8);
        let matrix = model.matrix(1.9, 0.8);
        for (got, want) in matrix.home_marginal().iter().zip(&home.probs) {
            assert!((got - want).abs() < 1e-9);
        }
        for (got, want) in matrix.away_marginal().iter().zip(&away.probs) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn expected_goals_is_clamped() {
        let model = PoissonModel::default();
        assert_eq!(model.expected_goals(0.01, 0.01, 1.35, 0.0), 0.3);
        assert_eq!(model.expected_goals(10.0, 10.0, 1.35, 1.0), 5.0);
    }

    #[test]
    fn stronger_home_attack_favors_home_win() {
        let model = PoissonModel::default();
        let pred = model.predict_match(1.8, 1.4, 0.8, 0.7, 1.35, 0.25);
        assert!(pred.outcome.home > pred.outcome.away);
        let sum = pred.outcome.home + pred.outcome.draw + pred.outcome.away;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(pred.home_xg > pred.away_xg);
    }

    #[test]
    fn over_probs_are_monotone_in_threshold() {
        let model = PoissonModel::default();
        let pred = model.predict_match(1.0, 1.0, 1.0, 1.0, 1.35, 0.25);
        assert!(pred.over_1_5 > pred.over_2_5);
        assert!(pred.over_2_5 > pred.over_3_5);
        assert!(pred.btts > 0.0 && pred.btts < 1.0);
    }

    #[test]
    fn top_scorelines_break_ties_by_lower_total() {
        let model = PoissonModel::default();
        let matrix = model.matrix(1.35, 1.35);
        let top = matrix.top_scorelines(5);
        assert_eq!(top.len(), 5);
        for pair in top.windows(2) {
            let same_prob = (pair[0].probability - pair[1].probability).abs() < 1e-15;
            if same_prob {
                assert!(pair[0].home + pair[0].away <= pair[1].home + pair[1].away);
            } else {
                assert!(pair[0].probability > pair[1].probability);
            }
        }
    }

    #[test]
    fn zero_defense_falls_back_to_neutral_weakness() {
        let model = PoissonModel::default();
        let pred = model.predict_match(1.0, 0.0, 1.0, 0.0, 1.35, 0.0);
        assert!(pred.home_xg.is_finite() && pred.away_xg.is_finite());
        assert!((pred.home_xg - 1.35).abs() < 1e-9);
    }
}
