//! Persisted log of finished play sessions.

use crate::core::game::SessionSummary;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Session summaries in the order they finished.
#[derive(Debug, Default)]
pub struct SessionHistory {
    sessions: Vec<SessionSummary>,
    persist_path: Option<PathBuf>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History backed by a JSON file; existing entries are loaded.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut history = Self {
            sessions: Vec::new(),
            persist_path: Some(path),
        };
        if let Err(e) = history.load() {
            warn!("Could not load session history: {e}");
        }
        history
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.sessions = serde_json::from_str(&content).map_err(std::io::Error::other)?;
                debug!("Loaded {} past sessions", self.sessions.len());
            }
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.sessions).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Record a session and persist immediately.
    pub fn append(&mut self, summary: SessionSummary) -> Result<(), std::io::Error> {
        self.sessions.push(summary);
        self.save()
    }

    /// The last `limit` sessions, oldest first.
    pub fn recent(&self, limit: usize) -> &[SessionSummary] {
        let start = self.sessions.len().saturating_sub(limit);
        &self.sessions[start..]
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::physio::DifficultyTier;
    use crate::core::signal::BpmEstimate;
    use chrono::Utc;
    use uuid::Uuid;

    fn summary(score: u32) -> SessionSummary {
        SessionSummary {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_secs: 60.0,
            score,
            hits: score / 10,
            misses: 0,
            accuracy: 1.0,
            difficulty: DifficultyTier::Normal,
            last_bpm: BpmEstimate::Known(72),
            completed: true,
        }
    }

    #[test]
    fn test_recent_limits() {
        let mut history = SessionHistory::new();
        for score in [10, 20, 30] {
            history.append(summary(score)).unwrap();
        }
        let scores: Vec<u32> = history.recent(2).iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![20, 30]);
        assert_eq!(history.recent(10).len(), 3);
    }

    #[test]
    fn test_persisted_history_reloads() {
        let path = std::env::temp_dir()
            .join(format!("companion-sense-history-{}", Uuid::new_v4()))
            .join("history.json");

        let mut history = SessionHistory::with_persistence(path.clone());
        history.append(summary(40)).unwrap();

        let reloaded = SessionHistory::with_persistence(path.clone());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.recent(1)[0].score, 40);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
