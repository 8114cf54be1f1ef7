use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{MemoryStorage, RatingStorage, rating_key};
use crate::types::Prob3;

#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
    pub default_rating: f64,
    pub rating_floor: f64,
    pub rating_ceiling: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 32.0,
            home_adv_pts: 65.0,
            default_rating: 1500.0,
            rating_floor: 1000.0,
            rating_ceiling: 2500.0,
        }
    }
}

/// A team's rating entry. `elo` always stays inside the configured
/// floor/ceiling; `home_elo`/`away_elo` are exponentially smoothed
/// venue-specific views updated only when the team plays at that venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRating {
    pub team: String,
    pub league: String,
    pub elo: f64,
    pub home_elo: f64,
    pub away_elo: f64,
    pub matches: u32,
    pub last_updated: DateTime<Utc>,
}

impl TeamRating {
    fn fresh(team: &str, league: &str, default_rating: f64) -> Self {
        Self {
            team: team.trim().to_string(),
            league: league.trim().to_string(),
            elo: default_rating,
            home_elo: default_rating,
            away_elo: default_rating,
            matches: 0,
            last_updated: Utc::now(),
        }
    }
}

// League strength relative to average. Unknown leagues get the default.
static LEAGUE_COEFFICIENTS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("premier league", 1.15),
        ("la liga", 1.10),
        ("bundesliga", 1.05),
        ("serie a", 1.05),
        ("ligue 1", 1.00),
        ("eredivisie", 0.90),
        ("primeira liga", 0.90),
        ("championship", 0.85),
        ("mls", 0.80),
        ("bundesliga 2", 0.75),
    ])
});

const DEFAULT_LEAGUE_COEFFICIENT: f64 = 0.85;

pub fn league_coefficient(league: &str) -> f64 {
    LEAGUE_COEFFICIENTS
        .get(league.trim().to_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_LEAGUE_COEFFICIENT)
}

/// Elo rating system with goal-difference and league-strength scaled updates.
///
/// Constructed once at startup and passed by reference to the simulators;
/// there is no global instance. All operations are total: an unknown team is
/// created lazily at the default rating, never an error.
pub struct EloRatings {
    cfg: EloConfig,
    store: Box<dyn RatingStorage>,
}

impl EloRatings {
    pub fn new(cfg: EloConfig) -> Self {
        Self::with_storage(cfg, Box::new(MemoryStorage::new()))
    }

    pub fn with_storage(cfg: EloConfig, store: Box<dyn RatingStorage>) -> Self {
        Self { cfg, store }
    }

    /// Ratings pre-seeded with historical club strengths, so a fresh process
    /// starts from realistic gaps instead of a flat default.
    pub fn with_preseeded() -> Self {
        let mut ratings = Self::new(EloConfig::default());
        for (league, team, elo) in PRESEEDED_RATINGS {
            ratings.set_elo(team, league, *elo);
        }
        ratings
    }

    pub fn config(&self) -> EloConfig {
        self.cfg
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get a team's rating entry, creating it at the default on first lookup.
    pub fn get(&mut self, team: &str, league: &str) -> TeamRating {
        let key = rating_key(team, league);
        match self.store.get(&key) {
            Some(rating) => rating,
            None => {
                let rating = TeamRating::fresh(team, league, self.cfg.default_rating);
                self.store.put(key, rating.clone());
                rating
            }
        }
    }

    /// Read-only lookup: the default rating when the team has no entry.
    /// Used by the simulators so a borrowed ratings source is never mutated
    /// mid-simulation.
    pub fn elo_or_default(&self, team: &str, league: &str) -> f64 {
        self.store
            .get(&rating_key(team, league))
            .map(|r| r.elo)
            .unwrap_or(self.cfg.default_rating)
    }

    pub fn set_elo(&mut self, team: &str, league: &str, elo: f64) {
        let mut rating = self.get(team, league);
        rating.elo = self.clamp_rating(elo);
        rating.last_updated = Utc::now();
        self.store.put(rating_key(team, league), rating);
    }

    pub fn put(&mut self, key: String, rating: TeamRating) {
        self.store.put(key, rating);
    }

    pub fn entries(&self) -> Vec<(String, TeamRating)> {
        self.store.entries()
    }

    /// Expected match score via the chess-style logistic curve.
    pub fn expected_score(&self, rating_a: f64, rating_b: f64, home_advantage: bool) -> (f64, f64) {
        let mut diff = rating_a - rating_b;
        if home_advantage {
            diff += self.cfg.home_adv_pts;
        }
        let pa = 1.0 / (1.0 + 10.0_f64.powf(-diff / 400.0));
        (pa, 1.0 - pa)
    }

    /// Apply a real match result and return the new (home, away) ratings.
    ///
    /// One goal-difference multiplier is computed per match (winner against
    /// loser), and the same effective K drives both sides, so the raw deltas
    /// are exact negatives when the league coefficient and importance are 1.
    /// Clamping at the floor/ceiling is the only asymmetry.
    pub fn apply_result(
        &mut self,
        home: &str,
        away: &str,
        home_goals: u32,
        away_goals: u32,
        league: &str,
        importance: f64,
    ) -> (f64, f64) {
        let mut home_rating = self.get(home, league);
        let mut away_rating = self.get(away, league);
        let home_elo = home_rating.elo;
        let away_elo = away_rating.elo;

        let (home_expected, away_expected) = self.expected_score(home_elo, away_elo, true);

        let (home_actual, away_actual, gd_mult) = if home_goals > away_goals {
            let mult = goal_diff_multiplier(home_goals - away_goals, home_elo, away_elo);
            (1.0, 0.0, mult)
        } else if home_goals < away_goals {
            let mult = goal_diff_multiplier(away_goals - home_goals, away_elo, home_elo);
            (0.0, 1.0, mult)
        } else {
            (0.5, 0.5, 1.0)
        };

        let k = self.cfg.k * gd_mult * league_coefficient(league) * importance;
        let new_home = self.clamp_rating(home_elo + k * (home_actual - home_expected));
        let new_away = self.clamp_rating(away_elo + k * (away_actual - away_expected));

        let now = Utc::now();
        home_rating.elo = new_home;
        home_rating.matches += 1;
        home_rating.home_elo = 0.7 * home_rating.home_elo + 0.3 * new_home;
        home_rating.last_updated = now;

        away_rating.elo = new_away;
        away_rating.matches += 1;
        away_rating.away_elo = 0.7 * away_rating.away_elo + 0.3 * new_away;
        away_rating.last_updated = now;

        self.store.put(rating_key(home, league), home_rating);
        self.store.put(rating_key(away, league), away_rating);

        (new_home, new_away)
    }

    /// Draw-aware 3-way outcome probabilities from the Elo gap.
    ///
    /// Two sigmoids offset by ±40 points carve out home-win and away-win
    /// mass; the remainder is the draw, clamped to [0.15, 0.35] before
    /// renormalization.
    pub fn predict_outcome(&mut self, home: &str, away: &str, league: &str) -> Prob3 {
        let home_elo = self.get(home, league).elo + self.cfg.home_adv_pts;
        let away_elo = self.get(away, league).elo;
        let diff = home_elo - away_elo;

        let home_win = 1.0 / (1.0 + 10.0_f64.powf(-(diff - 40.0) / 400.0));
        let away_win = 1.0 / (1.0 + 10.0_f64.powf((diff + 40.0) / 400.0));
        let draw = (1.0 - home_win - away_win).clamp(0.15, 0.35);

        Prob3 { home: home_win, draw, away: away_win }.normalized()
    }

    /// Move ratings of teams inactive for longer than the threshold 5% of
    /// the way back toward the default. Saturating: repeated calls shrink the
    /// remaining gap geometrically and never overshoot.
    pub fn decay(&mut self, inactivity_threshold_days: i64) {
        let now = Utc::now();
        let default = self.cfg.default_rating;
        for (key, mut rating) in self.store.entries() {
            let idle_days = (now - rating.last_updated).num_days();
            if idle_days <= inactivity_threshold_days {
                continue;
            }
            let before = rating.elo;
            rating.elo -= (rating.elo - default) * 0.05;
            debug!(team = %rating.team, before, after = rating.elo, "rating decay");
            self.store.put(key, rating);
        }
    }

    /// Adjust a rating for cross-competition comparison, e.g. seeding a
    /// continental bracket from domestic ratings. Additive shift scaled by
    /// the ratio of the two league coefficients.
    pub fn cross_league_adjust(&mut self, team: &str, from_league: &str, to_league: &str) -> f64 {
        let raw = self.get(team, from_league).elo;
        let from_coef = league_coefficient(from_league);
        let to_coef = league_coefficient(to_league);
        raw + (from_coef / to_coef - 1.0) * 100.0
    }

    /// Teams ranked by rating, strongest first.
    pub fn rankings(&self, top_n: Option<usize>) -> Vec<TeamRating> {
        let mut ranked: Vec<TeamRating> =
            self.store.entries().into_iter().map(|(_, r)| r).collect();
        ranked.sort_by(|a, b| b.elo.total_cmp(&a.elo));
        if let Some(n) = top_n {
            ranked.truncate(n);
        }
        ranked
    }

    fn clamp_rating(&self, elo: f64) -> f64 {
        elo.clamp(self.cfg.rating_floor, self.cfg.rating_ceiling)
    }
}

/// K-factor multiplier for the margin of victory, with an upset boost when
/// the lower-rated side wins.
fn goal_diff_multiplier(goal_diff: u32, winner_elo: f64, loser_elo: f64) -> f64 {
    let mut mult = match goal_diff {
        0 | 1 => 1.0,
        2 => 1.5,
        3 => 1.75,
        d => 1.75 + (d - 3) as f64 * 0.125,
    };
    if loser_elo > winner_elo {
        mult *= 1.0 + ((loser_elo - winner_elo) / 500.0).min(0.3);
    }
    mult
}

/// Historical club strengths used by [`EloRatings::with_preseeded`]. Name
/// aliases are deliberate so common short forms resolve to the same strength.
const PRESEEDED_RATINGS: &[(&str, &str, f64)] = &[
    ("Premier League", "Manchester City", 1950.0),
    ("Premier League", "Arsenal", 1920.0),
    ("Premier League", "Liverpool", 1910.0),
    ("Premier League", "Chelsea", 1850.0),
    ("Premier League", "Manchester United", 1830.0),
    ("Premier League", "Tottenham Hotspur", 1800.0),
    ("Premier League", "Tottenham", 1800.0),
    ("Premier League", "Newcastle United", 1780.0),
    ("Premier League", "Brighton & Hove Albion", 1750.0),
    ("Premier League", "Brighton", 1750.0),
    ("Premier League", "Aston Villa", 1740.0),
    ("Premier League", "West Ham United", 1720.0),
    ("Premier League", "West Ham", 1720.0),
    ("Premier League", "Brentford", 1700.0),
    ("Premier League", "Crystal Palace", 1690.0),
    ("Premier League", "Fulham", 1680.0),
    ("Premier League", "Leicester City", 1680.0),
    ("Premier League", "Wolverhampton Wanderers", 1670.0),
    ("Premier League", "Wolves", 1670.0),
    ("Premier League", "Bournemouth", 1660.0),
    ("Premier League", "Nottingham Forest", 1650.0),
    ("Premier League", "Everton", 1640.0),
    ("Premier League", "Leeds United", 1620.0),
    ("Premier League", "Southampton", 1600.0),
    ("Premier League", "Sunderland", 1590.0),
    ("Premier League", "Ipswich Town", 1580.0),
    ("Premier League", "Luton Town", 1580.0),
    ("Premier League", "Burnley", 1570.0),
    ("Premier League", "Sheffield United", 1560.0),
    ("La Liga", "Real Madrid", 1970.0),
    ("La Liga", "Barcelona", 1940.0),
    ("La Liga", "Atletico Madrid", 1850.0),
    ("La Liga", "Real Sociedad", 1780.0),
    ("La Liga", "Athletic Bilbao", 1760.0),
    ("La Liga", "Real Betis", 1740.0),
    ("La Liga", "Villarreal", 1730.0),
    ("La Liga", "Sevilla", 1720.0),
    ("La Liga", "Valencia", 1700.0),
    ("La Liga", "Girona", 1690.0),
    ("Bundesliga", "Bayern Munich", 1960.0),
    ("Bundesliga", "Borussia Dortmund", 1880.0),
    ("Bundesliga", "Bayer Leverkusen", 1850.0),
    ("Bundesliga", "RB Leipzig", 1840.0),
    ("Bundesliga", "Eintracht Frankfurt", 1760.0),
    ("Serie A", "Inter Milan", 1900.0),
    ("Serie A", "Napoli", 1870.0),
    ("Serie A", "AC Milan", 1850.0),
    ("Serie A", "Juventus", 1840.0),
    ("Serie A", "Atalanta", 1800.0),
    ("Serie A", "Roma", 1780.0),
    ("Serie A", "Lazio", 1760.0),
    ("Ligue 1", "Paris Saint-Germain", 1920.0),
    ("Ligue 1", "PSG", 1920.0),
    ("Ligue 1", "Monaco", 1780.0),
    ("Ligue 1", "Marseille", 1760.0),
    ("Ligue 1", "Lyon", 1740.0),
    ("Ligue 1", "Lille", 1720.0),
];
