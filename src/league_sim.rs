use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::elo::EloRatings;
use crate::sim::{SimOptions, sample_poisson};

/// A team's current league position inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRow {
    pub team: String,
    pub points: i64,
    pub goal_diff: i64,
    pub played: u32,
}

/// A remaining fixture, by team name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub home: String,
    pub away: String,
}

/// Per-team aggregate over all completed trials.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedStanding {
    pub team: String,
    pub current_position: usize,
    pub current_points: i64,
    pub current_gd: i64,
    pub current_played: u32,
    pub avg_final_position: f64,
    pub avg_final_points: f64,
    pub position_std: f64,
    pub title_probability: f64,
    pub top_4_probability: f64,
    pub europa_probability: f64,
    pub relegation_probability: f64,
    /// `position_distribution[i]` is the probability of finishing in
    /// position `i + 1`.
    pub position_distribution: Vec<f64>,
}

/// Complete projection for a league. `n_trials` is the number of trials that
/// actually completed; cancellation can leave it below the requested count,
/// and an unavailable simulation (empty standings) reports zero.
#[derive(Debug, Clone, Serialize)]
pub struct LeagueProjection {
    pub n_trials: u64,
    pub remaining_fixtures: usize,
    pub skipped_fixtures: usize,
    pub standings: Vec<SimulatedStanding>,
    pub most_likely_champion: Option<String>,
    pub champion_probability: f64,
    pub likely_top_4: Vec<String>,
    pub relegation_candidates: Vec<String>,
}

impl LeagueProjection {
    fn unavailable() -> Self {
        Self {
            n_trials: 0,
            remaining_fixtures: 0,
            skipped_fixtures: 0,
            standings: Vec::new(),
            most_likely_champion: None,
            champion_probability: 0.0,
            likely_top_4: Vec::new(),
            relegation_candidates: Vec::new(),
        }
    }
}

/// Monte-Carlo league standings projector.
///
/// Trials are independent and run in parallel; each trial gets its own RNG
/// derived from the master seed and the trial index, and results reduce into
/// integer counters, so a fixed seed reproduces identical aggregates
/// regardless of scheduling. Within a trial, fixtures are resolved strictly
/// in listed order on the trial's private points table.
#[derive(Debug, Clone, Copy)]
pub struct LeagueSimulator {
    pub home_advantage: f64,
}

impl Default for LeagueSimulator {
    fn default() -> Self {
        Self { home_advantage: 0.25 }
    }
}

impl LeagueSimulator {
    pub fn simulate(
        &self,
        standings: &[StandingRow],
        fixtures: &[Fixture],
        ratings: &EloRatings,
        league: &str,
        opts: &SimOptions,
    ) -> LeagueProjection {
        if standings.is_empty() {
            warn!(league, "league simulation requested with empty standings");
            return LeagueProjection::unavailable();
        }

        let n_teams = standings.len();
        let index: HashMap<String, usize> = standings
            .iter()
            .enumerate()
            .map(|(i, row)| (normalize(&row.team), i))
            .collect();

        // Fixtures naming a team outside the table are dropped up front;
        // one bad fixture must not sink the whole simulation.
        let mut resolved: Vec<(usize, usize)> = Vec::with_capacity(fixtures.len());
        let mut skipped = 0usize;
        for fixture in fixtures {
            match (
                index.get(&normalize(&fixture.home)),
                index.get(&normalize(&fixture.away)),
            ) {
                (Some(&h), Some(&a)) => resolved.push((h, a)),
                _ => {
                    skipped += 1;
                    warn!(
                        home = %fixture.home,
                        away = %fixture.away,
                        "skipping fixture with unknown team"
                    );
                }
            }
        }

        let elos: Vec<f64> = standings
            .iter()
            .map(|row| ratings.elo_or_default(&row.team, league))
            .collect();
        let base_points: Vec<i64> = standings.iter().map(|r| r.points).collect();
        let base_gd: Vec<i64> = standings.iter().map(|r| r.goal_diff).collect();

        let master_seed = opts.seed.unwrap_or_else(rand::random);
        let cancel = opts.cancel.clone();
        let home_advantage = self.home_advantage;

        let accum = (0..opts.n_trials as u64)
            .into_par_iter()
            .fold(
                || Accum::new(n_teams),
                |mut acc, trial| {
                    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                        return acc;
                    }
                    let mut rng = StdRng::seed_from_u64(master_seed.wrapping_add(trial));
                    run_trial(
                        &mut rng,
                        &resolved,
                        &elos,
                        &base_points,
                        &base_gd,
                        home_advantage,
                        &mut acc,
                    );
                    acc
                },
            )
            .reduce(|| Accum::new(n_teams), Accum::merge);

        if accum.trials == 0 {
            let mut projection = LeagueProjection::unavailable();
            projection.remaining_fixtures = resolved.len();
            projection.skipped_fixtures = skipped;
            return projection;
        }

        self.build_projection(standings, resolved.len(), skipped, accum)
    }

    fn build_projection(
        &self,
        standings: &[StandingRow],
        remaining: usize,
        skipped: usize,
        accum: Accum,
    ) -> LeagueProjection {
        let n_teams = standings.len();
        let trials = accum.trials as f64;
        let current_positions = current_positions(standings);

        let mut rows: Vec<SimulatedStanding> = Vec::with_capacity(n_teams);
        for (team_idx, row) in standings.iter().enumerate() {
            let hist = &accum.pos_hist[team_idx * n_teams..(team_idx + 1) * n_teams];
            let distribution: Vec<f64> = hist.iter().map(|c| *c as f64 / trials).collect();

            let mean_pos = accum.pos_sum[team_idx] as f64 / trials;
            let mean_sq = accum.pos_sq_sum[team_idx] as f64 / trials;
            let variance = (mean_sq - mean_pos * mean_pos).max(0.0);

            let title = distribution.first().copied().unwrap_or(0.0);
            let top_4: f64 = distribution.iter().take(4).sum();
            let europa: f64 = distribution.iter().skip(4).take(3).sum();
            let relegation: f64 = distribution
                .iter()
                .skip(n_teams.saturating_sub(3))
                .sum();

            rows.push(SimulatedStanding {
                team: row.team.clone(),
                current_position: current_positions[team_idx],
                current_points: row.points,
                current_gd: row.goal_diff,
                current_played: row.played,
                avg_final_position: mean_pos,
                avg_final_points: accum.points_sum[team_idx] as f64 / trials,
                position_std: variance.sqrt(),
                title_probability: title,
                top_4_probability: top_4,
                europa_probability: europa,
                relegation_probability: relegation,
                position_distribution: distribution,
            });
        }

        rows.sort_by(|a, b| a.avg_final_position.total_cmp(&b.avg_final_position));

        // Most likely champion is the argmax of title probability, which is
        // not always the team with the best mean position.
        let champion = rows
            .iter()
            .max_by(|a, b| a.title_probability.total_cmp(&b.title_probability));
        let (most_likely_champion, champion_probability) = match champion {
            Some(c) => (Some(c.team.clone()), c.title_probability),
            None => (None, 0.0),
        };

        let mut by_top4 = rows.clone();
        by_top4.sort_by(|a, b| b.top_4_probability.total_cmp(&a.top_4_probability));
        let likely_top_4 = by_top4.iter().take(4).map(|s| s.team.clone()).collect();

        let mut by_relegation = rows.clone();
        by_relegation
            .sort_by(|a, b| b.relegation_probability.total_cmp(&a.relegation_probability));
        let relegation_candidates =
            by_relegation.iter().take(3).map(|s| s.team.clone()).collect();

        LeagueProjection {
            n_trials: accum.trials,
            remaining_fixtures: remaining,
            skipped_fixtures: skipped,
            standings: rows,
            most_likely_champion,
            champion_probability,
            likely_top_4,
            relegation_candidates,
        }
    }
}

/// One trial: replay every remaining fixture on a private copy of the table,
/// then rank by points and goal difference.
fn run_trial(
    rng: &mut StdRng,
    fixtures: &[(usize, usize)],
    elos: &[f64],
    base_points: &[i64],
    base_gd: &[i64],
    home_advantage: f64,
    acc: &mut Accum,
) {
    let n_teams = elos.len();
    let mut points = base_points.to_vec();
    let mut gd = base_gd.to_vec();

    for &(home, away) in fixtures {
        let diff = (elos[home] - elos[away]) / 400.0;
        let home_xg = (1.35 * (1.0 + diff * 0.3) + home_advantage).clamp(0.5, 4.0);
        let away_xg = (1.35 * (1.0 - diff * 0.3)).clamp(0.3, 3.5);

        let home_goals = sample_poisson(rng, home_xg) as i64;
        let away_goals = sample_poisson(rng, away_xg) as i64;

        if home_goals > away_goals {
            points[home] += 3;
        } else if home_goals < away_goals {
            points[away] += 3;
        } else {
            points[home] += 1;
            points[away] += 1;
        }
        gd[home] += home_goals - away_goals;
        gd[away] += away_goals - home_goals;
    }

    let mut order: Vec<usize> = (0..n_teams).collect();
    order.sort_by_key(|&t| (-points[t], -gd[t], t));

    for (rank, &team) in order.iter().enumerate() {
        acc.pos_hist[team * n_teams + rank] += 1;
        let position = (rank + 1) as u64;
        acc.pos_sum[team] += position;
        acc.pos_sq_sum[team] += position * position;
        acc.points_sum[team] += points[team];
    }
    acc.trials += 1;
}

/// Integer-only trial accumulator; merging is commutative so rayon can
/// reduce partial results in any order without changing the answer.
struct Accum {
    trials: u64,
    pos_hist: Vec<u64>,
    pos_sum: Vec<u64>,
    pos_sq_sum: Vec<u64>,
    points_sum: Vec<i64>,
}

impl Accum {
    fn new(n_teams: usize) -> Self {
        Self {
            trials: 0,
            pos_hist: vec![0; n_teams * n_teams],
            pos_sum: vec![0; n_teams],
            pos_sq_sum: vec![0; n_teams],
            points_sum: vec![0; n_teams],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.trials += other.trials;
        for (a, b) in self.pos_hist.iter_mut().zip(&other.pos_hist) {
            *a += b;
        }
        for (a, b) in self.pos_sum.iter_mut().zip(&other.pos_sum) {
            *a += b;
        }
        for (a, b) in self.pos_sq_sum.iter_mut().zip(&other.pos_sq_sum) {
            *a += b;
        }
        for (a, b) in self.points_sum.iter_mut().zip(&other.points_sum) {
            *a += b;
        }
        self
    }
}

fn current_positions(standings: &[StandingRow]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..standings.len()).collect();
    order.sort_by_key(|&i| (-standings[i].points, -standings[i].goal_diff, i));
    let mut positions = vec![0; standings.len()];
    for (rank, &idx) in order.iter().enumerate() {
        positions[idx] = rank + 1;
    }
    positions
}

fn normalize(team: &str) -> String {
    team.trim().to_lowercase()
}
