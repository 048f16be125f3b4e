//! Demonstration of the Companion Sense processing core.
//!
//! This example shows how to:
//! 1. Calibrate the floor plane from four camera-space corners
//! 2. Configure a start pad and three target zones
//! 3. Replay synthetic landmarks through the engine frame by frame
//! 4. React to zone activations and game outcomes
//! 5. Feed external emotion/fatigue labels into difficulty adaptation
//!
//! Run with: cargo run --example pipeline_demo
//!
//! The replay runs on simulated time, so it finishes immediately and prints
//! the same output on every run.

use std::sync::Arc;
use std::time::Duration;

use companion_sense::{
    core::{Emotion, GameConfig, InteractionStateMachine, Level, PhysiologicalSummary},
    source::synthetic::{demo_zones, DEMO_CORNERS},
    source::{LandmarkEvent, LandmarkSource},
    Config, Engine, PipelineCounters, SyntheticConfig, SyntheticSource,
};

const FPS: f64 = 30.0;
const DEMO_SECS: f64 = 30.0;

fn main() {
    println!("Companion Sense - Pipeline Demo");
    println!("===============================");
    println!();

    let mut config = Config::default();
    config.pipeline.frame_budget = Duration::from_secs(1);
    let counters = Arc::new(PipelineCounters::new());
    let game = InteractionStateMachine::with_seed(GameConfig::default(), 2024);
    let mut engine = Engine::with_game(&config, game, Arc::clone(&counters));

    println!("Calibrating floor corners...");
    for (index, [x, y]) in DEMO_CORNERS.iter().enumerate() {
        if let Err(e) = engine.set_calibration_point(index, *x, *y) {
            eprintln!("Error setting corner {index}: {e}");
            return;
        }
    }
    if let Err(e) = engine.compute_homography() {
        eprintln!("Error computing homography: {e}");
        return;
    }

    let zones = demo_zones(config.calibration.canonical_size);
    for zone in &zones {
        println!("  zone {} ({})", zone.id, zone.name);
    }
    if let Err(e) = engine.configure_zones(zones) {
        eprintln!("Error configuring zones: {e}");
        return;
    }
    if let Err(e) = engine.set_ready() {
        eprintln!("Error: {e}");
        return;
    }
    println!();
    println!("Replaying {DEMO_SECS:.0}s of synthetic landmarks at {FPS:.0} fps...");
    println!();

    let mut source = SyntheticSource::new(SyntheticConfig {
        pulse_hz: 1.55,
        ..SyntheticConfig::default()
    });

    let frames = (DEMO_SECS * FPS) as usize;
    let mut stressed = false;
    for i in 0..frames {
        let now = i as f64 / FPS;

        if let Some(sample) = source.next_sample(now) {
            engine.ingest(LandmarkEvent::Sample(sample));
        }
        engine.ingest(LandmarkEvent::Point {
            observation: source.next_point(now),
            at: now,
        });

        let report = engine.get_zone_state();
        for activation in &report.activations {
            let outcome = engine.last_outcomes().first().copied();
            println!(
                "  t={:>5.2}s  zone {} activated -> {:?}",
                activation.at, activation.zone_id, outcome
            );
        }

        // Halfway through, the external classifier reports a tired user
        if !stressed && now >= DEMO_SECS / 2.0 {
            stressed = true;
            println!();
            println!("  t={now:>5.2}s  classifier: tired, high fatigue");
            engine.set_physiology(PhysiologicalSummary {
                emotion: Emotion::Tired,
                fatigue: Level::High,
                ..PhysiologicalSummary::default()
            });
        }

        engine.tick(now);

        if i > 0 && i % (5 * FPS as usize) == 0 {
            let game = engine.get_game_state(now);
            println!();
            println!(
                "  [{:>4.1}s] {}  bpm={}  score={}  timer={}s  difficulty={}  stay={:.2}s",
                now,
                game.status,
                engine.get_bpm(),
                game.score,
                game.timer,
                game.difficulty,
                config.game.base_stay_secs * game.difficulty.scale()
            );
            println!();
        }
    }

    let now = DEMO_SECS;
    engine.stop_game(now);
    println!();
    println!("Sessions:");
    for session in engine.take_finished_sessions() {
        println!(
            "  {}  score {}  hits {}  misses {}  accuracy {:.0}%  completed {}",
            session.id,
            session.score,
            session.hits,
            session.misses,
            session.accuracy * 100.0,
            session.completed
        );
    }

    println!();
    match serde_json::to_string_pretty(&engine.assessment()) {
        Ok(json) => println!("Assessment:\n{json}"),
        Err(e) => eprintln!("Error serializing assessment: {e}"),
    }

    println!();
    println!("{}", counters.summary());
}
