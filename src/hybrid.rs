use serde::{Deserialize, Serialize};

use crate::poisson::{MatchPrediction, PoissonModel};
use crate::types::Prob3;

/// Weight given to an externally supplied outcome classifier when one is
/// present; the Poisson model carries the remainder.
const CLASSIFIER_WEIGHT: f64 = 0.6;

/// Rating plus season scoring form for one side of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamForm {
    pub elo: f64,
    pub goals_per_game: f64,
    pub conceded_per_game: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridPrediction {
    /// Final outcome probabilities, blended when a classifier was supplied.
    pub outcome: Prob3,
    /// 0 for a uniform prediction, approaching 1 for a certain one.
    pub confidence: f64,
    pub used_classifier: bool,
    pub poisson: MatchPrediction,
}

/// Blends the Poisson scoreline model with an optional externally supplied
/// outcome classifier. The classifier is a plain probability triple; whether
/// it is present is an explicit branch, and its absence can never fail the
/// prediction.
#[derive(Debug, Clone, Copy)]
pub struct HybridModel {
    pub poisson: PoissonModel,
    pub league_avg_goals: f64,
    pub home_advantage: f64,
}

impl Default for HybridModel {
    fn default() -> Self {
        Self {
            poisson: PoissonModel::default(),
            league_avg_goals: 1.35,
            home_advantage: 0.25,
        }
    }
}

impl HybridModel {
    /// Convert a team's rating and scoring form into attack/defense strength
    /// multipliers relative to the league average, each clamped to [0.5, 2].
    pub fn attack_defense(&self, form: TeamForm) -> (f64, f64) {
        let elo_factor = (form.elo - 1500.0) / 400.0;

        let attack =
            (form.goals_per_game / self.league_avg_goals) * (1.0 + elo_factor * 0.2);
        let attack = attack.clamp(0.5, 2.0);

        // A team that has conceded nothing yet gets a strong-but-finite prior.
        let base_defense = if form.conceded_per_game > 0.0 {
            self.league_avg_goals / form.conceded_per_game
        } else {
            1.5
        };
        let defense = (base_defense * (1.0 + elo_factor * 0.1)).clamp(0.5, 2.0);

        (attack, defense)
    }

    pub fn predict(
        &self,
        home: TeamForm,
        away: TeamForm,
        classifier: Option<Prob3>,
    ) -> HybridPrediction {
        let (home_attack, home_defense) = self.attack_defense(home);
        let (away_attack, away_defense) = self.attack_defense(away);

        let poisson = self.poisson.predict_match(
            home_attack,
            home_defense,
            away_attack,
            away_defense,
            self.league_avg_goals,
            self.home_advantage,
        );

        let (outcome, used_classifier) = match classifier {
            Some(ml) => (blend(ml, poisson.outcome), true),
            None => (poisson.outcome, false),
        };

        HybridPrediction {
            outcome,
            confidence: confidence(outcome),
            used_classifier,
            poisson,
        }
    }
}

fn blend(classifier: Prob3, poisson: Prob3) -> Prob3 {
    let w = CLASSIFIER_WEIGHT;
    Prob3 {
        home: w * classifier.home + (1.0 - w) * poisson.home,
        draw: w * classifier.draw + (1.0 - w) * poisson.draw,
        away: w * classifier.away + (1.0 - w) * poisson.away,
    }
    .normalized()
}

/// Entropy-based confidence relative to the uniform triple.
fn confidence(p: Prob3) -> f64 {
    let max_entropy = 3.0_f64.ln();
    (1.0 - p.entropy() / max_entropy).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn average_form(elo: f64) -> TeamForm {
        TeamForm { elo, goals_per_game: 1.35, conceded_per_game: 1.35 }
    }

    #[test]
    fn average_team_has_unit_strengths() {
        let model = HybridModel::default();
        let (attack, defense) = model.attack_defense(average_form(1500.0));
        assert!((attack - 1.0).abs() < 1e-9);
        assert!((defense - 1.0).abs() < 1e-9);
    }

    #[test]
    fn strengths_are_clamped() {
        let model = HybridModel::default();
        let (attack, defense) = model.attack_defense(TeamForm {
            elo: 2400.0,
            goals_per_game: 6.0,
            conceded_per_game: 0.1,
        });
        assert_eq!(attack, 2.0);
        assert_eq!(defense, 2.0);

        let (attack, defense) = model.attack_defense(TeamForm {
            elo: 1000.0,
            goals_per_game: 0.1,
            conceded_per_game: 4.0,
        });
        assert_eq!(attack, 0.5);
        assert_eq!(defense, 0.5);
    }

    #[test]
    fn zero_conceded_uses_finite_prior() {
        let model = HybridModel::default();
        let (_, defense) = model.attack_defense(TeamForm {
            elo: 1500.0,
            goals_per_game: 2.0,
            conceded_per_game: 0.0,
        });
        assert!((defense - 1.5).abs() < 1e-9);
    }

    #[test]
    fn poisson_only_when_no_classifier() {
        let model = HybridModel::default();
        let pred = model.predict(average_form(1700.0), average_form(1400.0), None);
        assert!(!pred.used_classifier);
        assert_eq!(pred.outcome, pred.poisson.outcome);
        assert!(pred.outcome.home > pred.outcome.away);
    }

    #[test]
    fn classifier_blend_pulls_probabilities() {
        let model = HybridModel::default();
        let home = average_form(1500.0);
        let away = average_form(1500.0);
        let classifier = Prob3 { home: 0.1, draw: 0.1, away: 0.8 };

        let pure = model.predict(home, away, None);
        let blended = model.predict(home, away, Some(classifier));

        assert!(blended.used_classifier);
        assert!(blended.outcome.away > pure.outcome.away);
        assert_eq!(blended.outcome.argmax(), Outcome::Away);
        let sum = blended.outcome.home + blended.outcome.draw + blended.outcome.away;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_tracks_certainty() {
        assert!(confidence(Prob3::uniform()) < 1e-9);
        let near_certain = Prob3 { home: 0.97, draw: 0.02, away: 0.01 };
        assert!(confidence(near_certain) > 0.7);
        let model = HybridModel::default();
        let pred = model.predict(average_form(2100.0), average_form(1300.0), None);
        let level = model.predict(average_form(1500.0), average_form(1500.0), None);
        assert!(pred.confidence > level.confidence);
    }
}
