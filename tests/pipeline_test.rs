//! Integration tests for the sensing pipeline

use companion_sense::core::{GameConfig, GameStatus, InteractionStateMachine, Zone};
use companion_sense::source::synthetic::{demo_zones, DEMO_CORNERS};
use companion_sense::source::{LandmarkEvent, LandmarkSource};
use companion_sense::{
    BpmEstimate, CalibrationStatus, Config, ConfigStore, Engine, MemoryStore, Pipeline,
    PipelineCounters, PipelineError, Snapshot, SyntheticConfig, SyntheticSource,
};
use std::sync::Arc;
use std::time::Duration;

const FPS: f64 = 30.0;

fn test_config() -> Config {
    let mut config = Config::default();
    config.data_path = std::env::temp_dir().join(format!("companion-sense-test-{}", uuid::Uuid::new_v4()));
    // Debug builds are slow; overruns have their own unit test
    config.pipeline.frame_budget = Duration::from_secs(5);
    config
}

fn calibrated_engine(config: &Config, counters: Arc<PipelineCounters>) -> Engine {
    let game = InteractionStateMachine::with_seed(GameConfig::default(), 7);
    let mut engine = Engine::with_game(config, game, counters);
    for (i, [x, y]) in DEMO_CORNERS.iter().enumerate() {
        engine.set_calibration_point(i, *x, *y).unwrap();
    }
    engine.compute_homography().unwrap();
    engine
        .configure_zones(demo_zones(config.calibration.canonical_size))
        .unwrap();
    engine
}

fn calibrate(pipeline: &Pipeline) {
    for (i, [x, y]) in DEMO_CORNERS.iter().enumerate() {
        pipeline.set_calibration_point(i, *x, *y).unwrap();
    }
    pipeline.compute_homography().unwrap();
    pipeline
        .configure_zones(demo_zones(pipeline.config().calibration.canonical_size))
        .unwrap();
}

#[test]
fn test_engine_end_to_end_with_synthetic_walk() {
    let config = test_config();
    let counters = Arc::new(PipelineCounters::new());
    let mut engine = calibrated_engine(&config, Arc::clone(&counters));
    engine.set_ready().unwrap();

    let mut source = SyntheticSource::new(SyntheticConfig::default());
    let frames = (6.5 * FPS) as usize;
    for i in 0..frames {
        let now = i as f64 / FPS;
        if let Some(sample) = source.next_sample(now) {
            engine.ingest(LandmarkEvent::Sample(sample));
        }
        engine.ingest(LandmarkEvent::Point {
            observation: source.next_point(now),
            at: now,
        });
        engine.tick(now);
    }

    let now = (frames - 1) as f64 / FPS;
    let status = engine.status(now);

    // 1.2 Hz pulse
    let bpm = status.bpm.value().expect("window should be full after 5 s");
    assert!((bpm as i64 - 72).abs() <= 4, "expected ~72 bpm, got {bpm}");

    // Standing on the start pad started the round
    assert_eq!(status.game.status, GameStatus::Playing);
    assert!(status.game.timer > 50 && status.game.timer <= 60);
    assert_eq!(status.calibration, CalibrationStatus::Calibrated);

    let stats = counters.stats();
    assert!(stats.activations >= 2, "got {} activations", stats.activations);
    assert_eq!(stats.samples_rejected, 0);
    assert!(stats.estimates > 0);
}

#[test]
fn test_engine_without_calibration_never_activates() {
    let config = test_config();
    let counters = Arc::new(PipelineCounters::new());
    let mut engine = Engine::new(&config, Arc::clone(&counters));
    engine
        .configure_zones(demo_zones(config.calibration.canonical_size))
        .unwrap();
    engine.set_ready().unwrap();

    let mut source = SyntheticSource::new(SyntheticConfig::default());
    for i in 0..(3.0 * FPS) as usize {
        let now = i as f64 / FPS;
        engine.ingest(LandmarkEvent::Point {
            observation: source.next_point(now),
            at: now,
        });
        engine.tick(now);
    }

    assert_eq!(engine.get_game_state(3.0).status, GameStatus::Ready);
    assert_eq!(counters.stats().activations, 0);
    assert_eq!(engine.get_bpm(), BpmEstimate::Unknown);
}

#[test]
fn test_pipeline_lifecycle() {
    let config = test_config();
    let counters = Arc::new(PipelineCounters::new());
    let mut pipeline = Pipeline::new(config, Arc::clone(&counters)).unwrap();
    calibrate(&pipeline);

    pipeline
        .start(SyntheticSource::new(SyntheticConfig::default()))
        .unwrap();
    assert!(pipeline.is_running());
    assert!(matches!(
        pipeline.start(SyntheticSource::new(SyntheticConfig::default())),
        Err(PipelineError::AlreadyRunning)
    ));

    std::thread::sleep(Duration::from_millis(300));
    pipeline.stop().unwrap();
    assert!(!pipeline.is_running());
    assert!(matches!(pipeline.stop(), Err(PipelineError::NotRunning)));

    let stats = counters.stats();
    assert!(stats.samples_accepted > 0);
    assert!(stats.points_detected > 0);

    // A stopped pipeline can be started again
    pipeline
        .start(SyntheticSource::new(SyntheticConfig::default()))
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    pipeline.dispose().unwrap();

    assert_eq!(counters.stats().samples_rejected, 0);
}

#[test]
fn test_pipeline_commands_while_running() {
    let config = test_config();
    let counters = Arc::new(PipelineCounters::new());
    let mut pipeline = Pipeline::new(config, counters).unwrap();
    calibrate(&pipeline);

    pipeline
        .start(SyntheticSource::new(SyntheticConfig::default()))
        .unwrap();
    pipeline.set_ready().unwrap();
    pipeline.start_game().unwrap();
    assert_eq!(pipeline.get_game_state().status, GameStatus::Playing);

    pipeline.pause().unwrap();
    assert_eq!(pipeline.get_game_state().status, GameStatus::Paused);
    assert!(pipeline.pause().is_err());
    pipeline.resume().unwrap();

    pipeline.stop_game();
    assert_eq!(pipeline.get_game_state().status, GameStatus::Sleep);

    let finished = pipeline.take_finished_sessions();
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].completed);

    pipeline.dispose().unwrap();
}

#[test]
fn test_snapshot_roundtrip_through_store() {
    let store = MemoryStore::new();

    let source = Pipeline::new(test_config(), Arc::new(PipelineCounters::new())).unwrap();
    assert!(!source.load_from(&store).unwrap());
    calibrate(&source);
    source.save_to(&store).unwrap();

    let restored = Pipeline::new(test_config(), Arc::new(PipelineCounters::new())).unwrap();
    assert!(restored.load_from(&store).unwrap());

    let status = restored.status();
    assert_eq!(status.calibration, CalibrationStatus::Calibrated);
    let ids: Vec<u32> = status.zones.zones.iter().map(|z| z.zone_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.calibration.unwrap().points, DEMO_CORNERS);
}

#[test]
fn test_invalid_snapshot_leaves_pipeline_untouched() {
    let pipeline = Pipeline::new(test_config(), Arc::new(PipelineCounters::new())).unwrap();
    calibrate(&pipeline);

    let plane = companion_sense::CalibrationPlane::default();
    let line = Zone::polygon(
        9,
        "line",
        vec![
            companion_sense::core::Point::new(0.0, 0.0),
            companion_sense::core::Point::new(10.0, 10.0),
        ],
    );
    let store = MemoryStore::with_snapshot(Snapshot::from_parts(&plane, &[line]));

    assert!(pipeline.load_from(&store).is_err());

    let status = pipeline.status();
    assert_eq!(status.calibration, CalibrationStatus::Calibrated);
    assert_eq!(status.zones.zones.len(), 4);
}
