//! Interaction state machine for the floor game.
//!
//! ```text
//!   SLEEP ──ready──▶ READY ──start zone──▶ PLAYING ◀──resume── PAUSED
//!     ▲                ▲                     │  └────pause──────▶ │
//!     │                └──────timer = 0──────┘                    │
//!     └────────────────────stop (from any state)──────────────────┘
//! ```
//!
//! While playing, at most one of the `K` target slots is lit. A lit target
//! expires after the stay duration; a new one is chosen uniformly at random
//! after the spawn delay. Both durations scale with the difficulty tier.
//!
//! All times are monotonic seconds supplied by the caller. Paused intervals are
//! excluded from the round timer and from the spawn and expiry deadlines.

use crate::core::physio::{classify_difficulty, BpmThresholds, DifficultyTier, PhysiologicalSummary};
use crate::core::signal::BpmEstimate;
use crate::core::zones::ZoneId;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    #[default]
    Sleep,
    Ready,
    Playing,
    Paused,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameStatus::Sleep => "SLEEP",
            GameStatus::Ready => "READY",
            GameStatus::Playing => "PLAYING",
            GameStatus::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

/// Round rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Length of a round in playing seconds
    pub round_secs: f64,
    /// Target stay duration at the normal tier
    pub base_stay_secs: f64,
    /// Delay before the next target at the normal tier
    pub base_spawn_delay_secs: f64,
    pub hit_points: u32,
    /// Subtracted when a target zone other than the lit one activates
    pub miss_penalty: Option<u32>,
    /// Zone that starts a round from READY
    pub start_zone_id: ZoneId,
    /// Zone id for each target slot
    pub target_zone_ids: Vec<ZoneId>,
    #[serde(default)]
    pub thresholds: BpmThresholds,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_secs: 60.0,
            base_stay_secs: 2.0,
            base_spawn_delay_secs: 0.5,
            hit_points: 10,
            miss_penalty: Some(5),
            start_zone_id: 0,
            target_zone_ids: vec![1, 2, 3],
            thresholds: BpmThresholds::default(),
        }
    }
}

/// Rejected commands. The machine is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    InvalidTransition {
        command: &'static str,
        status: GameStatus,
    },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::InvalidTransition { command, status } => {
                write!(f, "Cannot {command} while {status}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Result of feeding one activation into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Started,
    Hit { points: u32 },
    Miss { penalty: u32 },
    Ignored,
}

/// Record of a finished or abandoned round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Playing seconds, pauses excluded
    pub duration_secs: f64,
    pub score: u32,
    pub hits: u32,
    pub misses: u32,
    pub accuracy: f64,
    pub difficulty: DifficultyTier,
    pub last_bpm: BpmEstimate,
    /// False when the round was stopped before the timer ran out
    pub completed: bool,
}

/// Externally published game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub status: GameStatus,
    pub score: u32,
    /// Whole seconds remaining, rounded up
    pub timer: u32,
    /// Zone id of the lit target
    pub active_target: Option<ZoneId>,
    /// Slot of the lit target, -1 when none
    pub active_target_index: i32,
    pub difficulty: DifficultyTier,
    pub hits: u32,
    pub misses: u32,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTarget {
    slot: usize,
    expires_at: f64,
}

#[derive(Debug, Clone)]
struct Round {
    id: Uuid,
    started_at: DateTime<Utc>,
    started_mono: f64,
    ends_at: f64,
    paused_at: Option<f64>,
    paused_total: f64,
    target: Option<ActiveTarget>,
    next_spawn_at: f64,
}

impl Round {
    fn remaining(&self, now: f64) -> f64 {
        let reference = self.paused_at.unwrap_or(now);
        (self.ends_at - reference).max(0.0)
    }

    fn played(&self, now: f64) -> f64 {
        let reference = self.paused_at.unwrap_or(now);
        (reference - self.started_mono - self.paused_total).max(0.0)
    }
}

#[derive(Debug)]
pub struct InteractionStateMachine {
    config: GameConfig,
    status: GameStatus,
    score: u32,
    hits: u32,
    misses: u32,
    difficulty: DifficultyTier,
    last_bpm: BpmEstimate,
    round: Option<Round>,
    rng: StdRng,
}

impl InteractionStateMachine {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic target selection, for tests and replays.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        Self {
            config,
            status: GameStatus::Sleep,
            score: 0,
            hits: 0,
            misses: 0,
            difficulty: DifficultyTier::Normal,
            last_bpm: BpmEstimate::Unknown,
            round: None,
            rng,
        }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn difficulty(&self) -> DifficultyTier {
        self.difficulty
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Stay duration for targets spawned at the current tier.
    pub fn stay_secs(&self) -> f64 {
        self.config.base_stay_secs * self.difficulty.scale()
    }

    /// Spawn delay at the current tier.
    pub fn spawn_delay_secs(&self) -> f64 {
        self.config.base_spawn_delay_secs * self.difficulty.scale()
    }

    pub fn accuracy(&self) -> f64 {
        let attempts = self.hits + self.misses;
        if attempts == 0 {
            0.0
        } else {
            self.hits as f64 / attempts as f64
        }
    }

    fn transition(&mut self, to: GameStatus) {
        if self.status != to {
            info!("Game {} -> {}", self.status, to);
            self.status = to;
        }
    }

    /// SLEEP -> READY. Repeating it while READY is a no-op.
    pub fn set_ready(&mut self) -> Result<(), CommandError> {
        match self.status {
            GameStatus::Sleep | GameStatus::Ready => {
                self.transition(GameStatus::Ready);
                Ok(())
            }
            status => Err(CommandError::InvalidTransition {
                command: "ready",
                status,
            }),
        }
    }

    /// READY -> PLAYING with a fresh score and a full timer.
    pub fn start(&mut self, now: f64) -> Result<(), CommandError> {
        if self.status != GameStatus::Ready {
            return Err(CommandError::InvalidTransition {
                command: "start",
                status: self.status,
            });
        }

        self.score = 0;
        self.hits = 0;
        self.misses = 0;
        self.round = Some(Round {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            started_mono: now,
            ends_at: now + self.config.round_secs,
            paused_at: None,
            paused_total: 0.0,
            target: None,
            next_spawn_at: now + self.spawn_delay_secs(),
        });
        self.transition(GameStatus::Playing);
        Ok(())
    }

    /// PLAYING -> PAUSED. The timer freezes at `now`.
    pub fn pause(&mut self, now: f64) -> Result<(), CommandError> {
        match (self.status, self.round.as_mut()) {
            (GameStatus::Playing, Some(round)) => {
                round.paused_at = Some(now);
                self.transition(GameStatus::Paused);
                Ok(())
            }
            (status, _) => Err(CommandError::InvalidTransition {
                command: "pause",
                status,
            }),
        }
    }

    /// PAUSED -> PLAYING. Every deadline moves forward by the paused interval.
    pub fn resume(&mut self, now: f64) -> Result<(), CommandError> {
        let status = self.status;
        let Some(round) = self.round.as_mut().filter(|_| status == GameStatus::Paused) else {
            return Err(CommandError::InvalidTransition {
                command: "resume",
                status,
            });
        };

        let paused_at = round.paused_at.take().unwrap_or(now);
        let delta = (now - paused_at).max(0.0);
        round.ends_at += delta;
        round.next_spawn_at += delta;
        round.paused_total += delta;
        if let Some(target) = round.target.as_mut() {
            target.expires_at += delta;
        }
        debug!("Resumed after {delta:.3}s pause");
        self.transition(GameStatus::Playing);
        Ok(())
    }

    /// Any state -> SLEEP. Returns the summary of an interrupted round.
    pub fn stop(&mut self, now: f64) -> Option<SessionSummary> {
        let summary = self.round.take().map(|round| self.summarize(&round, now, false));
        self.score = 0;
        self.hits = 0;
        self.misses = 0;
        self.transition(GameStatus::Sleep);
        summary
    }

    /// Feed one zone activation.
    pub fn handle_activate(&mut self, zone_id: ZoneId, now: f64) -> ActivationOutcome {
        match self.status {
            GameStatus::Ready if zone_id == self.config.start_zone_id => {
                match self.start(now) {
                    Ok(()) => ActivationOutcome::Started,
                    Err(_) => ActivationOutcome::Ignored,
                }
            }
            GameStatus::Playing => self.score_activation(zone_id, now),
            _ => ActivationOutcome::Ignored,
        }
    }

    fn score_activation(&mut self, zone_id: ZoneId, now: f64) -> ActivationOutcome {
        let Some(slot) = self.config.target_zone_ids.iter().position(|&id| id == zone_id) else {
            return ActivationOutcome::Ignored;
        };
        let spawn_delay = self.spawn_delay_secs();
        let Some(round) = self.round.as_mut() else {
            return ActivationOutcome::Ignored;
        };

        match round.target {
            Some(target) if target.slot == slot => {
                round.target = None;
                round.next_spawn_at = now + spawn_delay;
                self.score += self.config.hit_points;
                self.hits += 1;
                debug!("Hit on zone {zone_id}, score {}", self.score);
                ActivationOutcome::Hit {
                    points: self.config.hit_points,
                }
            }
            _ => match self.config.miss_penalty {
                Some(penalty) => {
                    self.score = self.score.saturating_sub(penalty);
                    self.misses += 1;
                    debug!("Miss on zone {zone_id}, score {}", self.score);
                    ActivationOutcome::Miss { penalty }
                }
                None => ActivationOutcome::Ignored,
            },
        }
    }

    /// Advance timers. Returns the summary when the round runs out.
    pub fn tick(&mut self, now: f64) -> Option<SessionSummary> {
        if self.status != GameStatus::Playing {
            return None;
        }
        let stay = self.stay_secs();
        let spawn_delay = self.spawn_delay_secs();
        let slots = self.config.target_zone_ids.len();
        let round = self.round.as_mut()?;

        if now >= round.ends_at {
            let round = self.round.take()?;
            let summary = self.summarize(&round, now, true);
            info!(
                "Round finished: score {} ({} hits, {} misses)",
                summary.score, summary.hits, summary.misses
            );
            self.transition(GameStatus::Ready);
            return Some(summary);
        }

        if let Some(target) = round.target {
            if now >= target.expires_at {
                round.target = None;
                round.next_spawn_at = now + spawn_delay;
                debug!("Target slot {} expired", target.slot);
            }
        }

        if round.target.is_none() && now >= round.next_spawn_at && slots > 0 {
            let slot = self.rng.gen_range(0..slots);
            round.target = Some(ActiveTarget {
                slot,
                expires_at: now + stay,
            });
            debug!("Target slot {slot} lit for {stay:.2}s");
        }

        None
    }

    /// Re-tier from a physiological summary. Returns the tier now in force.
    ///
    /// Applies to targets spawned after the call; a lit target keeps its deadline.
    pub fn adapt_difficulty(&mut self, summary: &PhysiologicalSummary) -> DifficultyTier {
        if summary.bpm.is_known() {
            self.last_bpm = summary.bpm;
        }
        let tier = classify_difficulty(summary, self.difficulty, &self.config.thresholds);
        if tier != self.difficulty {
            info!("Difficulty {} -> {}", self.difficulty, tier);
            self.difficulty = tier;
        }
        tier
    }

    pub fn snapshot(&self, now: f64) -> GameSnapshot {
        let (timer, target) = match &self.round {
            Some(round) => (round.remaining(now).ceil() as u32, round.target),
            None => (self.config.round_secs.max(0.0).ceil() as u32, None),
        };
        GameSnapshot {
            status: self.status,
            score: self.score,
            timer,
            active_target: target.and_then(|t| self.config.target_zone_ids.get(t.slot).copied()),
            active_target_index: target.map_or(-1, |t| t.slot as i32),
            difficulty: self.difficulty,
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn summarize(&self, round: &Round, now: f64, completed: bool) -> SessionSummary {
        let duration_secs = if completed {
            self.config.round_secs
        } else {
            round.played(now)
        };
        SessionSummary {
            id: round.id,
            started_at: round.started_at,
            duration_secs,
            score: self.score,
            hits: self.hits,
            misses: self.misses,
            accuracy: self.accuracy(),
            difficulty: self.difficulty,
            last_bpm: self.last_bpm,
            completed,
        }
    }
}
