use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::elo::{EloConfig, EloRatings, TeamRating};
use crate::tracker::{PredictionRecord, PredictionTracker};

/// Write ratings to a single JSON file, keyed `"league:team"`.
pub fn save_ratings(path: &Path, ratings: &EloRatings) -> Result<()> {
    let map: BTreeMap<String, TeamRating> = ratings.entries().into_iter().collect();
    write_json(path, &map)?;
    info!(path = %path.display(), teams = map.len(), "ratings saved");
    Ok(())
}

/// Load ratings saved by [`save_ratings`]. A missing file yields an empty
/// rating system rather than an error, so first runs need no setup.
pub fn load_ratings(path: &Path, cfg: EloConfig) -> Result<EloRatings> {
    let mut ratings = EloRatings::new(cfg);
    if !path.exists() {
        return Ok(ratings);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading ratings file {}", path.display()))?;
    let map: HashMap<String, TeamRating> = serde_json::from_str(&text)
        .with_context(|| format!("parsing ratings file {}", path.display()))?;
    for (key, rating) in map {
        ratings.put(key, rating);
    }
    Ok(ratings)
}

/// Write tracked predictions into `dir`, one file per match month
/// (`predictions_YYYY-MM.json`), so old months stay untouched on disk once
/// their matches are resolved.
pub fn save_predictions(dir: &Path, tracker: &PredictionTracker) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating predictions dir {}", dir.display()))?;

    let mut by_month: BTreeMap<String, BTreeMap<String, PredictionRecord>> = BTreeMap::new();
    for record in tracker.records() {
        by_month
            .entry(record.match_date.format("predictions_%Y-%m.json").to_string())
            .or_default()
            .insert(record.match_id.clone(), record.clone());
    }

    for (file_name, records) in &by_month {
        write_json(&dir.join(file_name), records)?;
    }
    info!(dir = %dir.display(), months = by_month.len(), "predictions saved");
    Ok(())
}

/// Load and merge every monthly predictions file under `dir`. A missing
/// directory yields an empty tracker.
pub fn load_predictions(dir: &Path) -> Result<PredictionTracker> {
    if !dir.exists() {
        return Ok(PredictionTracker::new());
    }

    let mut all: Vec<PredictionRecord> = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading predictions dir {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("predictions_") || !name.ends_with(".json") {
            continue;
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading predictions file {}", path.display()))?;
        let records: HashMap<String, PredictionRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parsing predictions file {}", path.display()))?;
        all.extend(records.into_values());
    }
    Ok(PredictionTracker::from_records(all))
}

// Atomic write: serialize to a sibling .tmp file, then rename over the
// target so readers never observe a half-written snapshot.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing snapshot")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::tracker::NewPrediction;
    use crate::types::Prob3;

    #[test]
    fn ratings_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let mut ratings = EloRatings::new(EloConfig::default());
        ratings.set_elo("Arsenal", "Premier League", 1890.0);
        ratings.set_elo("Getafe", "La Liga", 1610.0);
        save_ratings(&path, &ratings).unwrap();

        let loaded = load_ratings(&path, EloConfig::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.elo_or_default("Arsenal", "Premier League"), 1890.0);
        assert_eq!(loaded.elo_or_default("Getafe", "La Liga"), 1610.0);
    }

    #[test]
    fn missing_ratings_file_loads_empty() {
        let dir = tempdir().unwrap();
        let loaded =
            load_ratings(&dir.path().join("absent.json"), EloConfig::default()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn predictions_split_by_month_and_merge_back() {
        let dir = tempdir().unwrap();
        let mut tracker = PredictionTracker::new();
        let mut this_month = NewPrediction {
            match_id: "now".to_string(),
            outcome: Prob3 { home: 0.6, draw: 0.25, away: 0.15 },
            ..NewPrediction::default()
        };
        this_month.league = "Premier League".to_string();
        tracker.store_prediction(this_month);
        tracker.store_prediction(NewPrediction {
            match_id: "then".to_string(),
            match_date: Utc::now() - Duration::days(60),
            ..NewPrediction::default()
        });
        tracker.record_outcome("now", 2, 0).unwrap();

        save_predictions(dir.path(), &tracker).unwrap();
        let files: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.starts_with("predictions_")));

        let loaded = load_predictions(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        let resolved = loaded.get("now").unwrap();
        assert_eq!(resolved.actual_home_goals, Some(2));
        assert!(loaded.get("then").is_some());
    }

    #[test]
    fn missing_predictions_dir_loads_empty() {
        let dir = tempdir().unwrap();
        let loaded = load_predictions(&dir.path().join("nowhere")).unwrap();
        assert!(loaded.is_empty());
    }
}
