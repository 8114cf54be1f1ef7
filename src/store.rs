use std::collections::HashMap;

use crate::elo::TeamRating;

/// Storage behind the rating system. Simulation code only ever sees
/// [`crate::elo::EloRatings`]; swapping this for a persistent backend does
/// not touch any simulation logic.
pub trait RatingStorage: Send {
    fn get(&self, key: &str) -> Option<TeamRating>;
    fn put(&mut self, key: String, rating: TeamRating);
    fn entries(&self) -> Vec<(String, TeamRating)>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: HashMap<String, TeamRating>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RatingStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<TeamRating> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: String, rating: TeamRating) {
        self.map.insert(key, rating);
    }

    fn entries(&self) -> Vec<(String, TeamRating)> {
        self.map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Canonical storage key: `"<league>:<team>"`, lowercased and trimmed so
/// "Arsenal"/"arsenal " resolve to the same entry.
pub fn rating_key(team: &str, league: &str) -> String {
    format!(
        "{}:{}",
        league.trim().to_lowercase(),
        team.trim().to_lowercase()
    )
}
