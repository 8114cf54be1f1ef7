//! Football match prediction and tournament simulation engine.
//!
//! The crate is organized around three layers:
//! - ratings: [`elo::EloRatings`] over a pluggable [`store::RatingStorage`],
//! - prediction: [`poisson::PoissonModel`] scorelines, optionally blended
//!   with an external classifier by [`hybrid::HybridModel`],
//! - simulation: Monte-Carlo [`league_sim::LeagueSimulator`] and
//!   [`knockout::KnockoutSimulator`], seeded and cancellable via
//!   [`sim::SimOptions`].
//!
//! [`tracker::PredictionTracker`] closes the loop by scoring stored
//! predictions against real results, and [`snapshot`] persists ratings and
//! the prediction log as JSON.

pub mod elo;
pub mod error;
pub mod hybrid;
pub mod knockout;
pub mod league_sim;
pub mod poisson;
pub mod sim;
pub mod snapshot;
pub mod store;
pub mod tracker;
pub mod types;

pub use elo::{EloConfig, EloRatings, TeamRating, league_coefficient};
pub use error::{EngineError, Result};
pub use hybrid::{HybridModel, HybridPrediction, TeamForm};
pub use knockout::{
    KnockoutSimulator, KnockoutTeam, TournamentKind, TournamentProjection, path_difficulty,
};
pub use league_sim::{Fixture, LeagueProjection, LeagueSimulator, SimulatedStanding, StandingRow};
pub use poisson::{MatchPrediction, PoissonModel, ScoreMatrix, Scoreline};
pub use sim::SimOptions;
pub use tracker::{
    AccuracyMetrics, ModelAdjustments, NewPrediction, PredictionRecord, PredictionTracker,
};
pub use types::{CancelToken, Outcome, Prob3};
