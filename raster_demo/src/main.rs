//! Rotating bodies demo
//!
//! Usage: `raster_demo [config.toml|config.ron]`
//!
//! Re-flattens the scene every frame and uploads it between draws when the
//! flattened vertices changed. An upload first waits on every frame slot, so
//! while the bodies spin the pipeline runs with one frame in flight whatever
//! `frames_in_flight` says. Resize or minimize the window to exercise surface
//! rebuilds; Escape quits.

use raster_engine::foundation::math::{Quat, Unit, Vec3};
use raster_engine::prelude::*;
use raster_engine::scene::{ObjectId, SceneError};
use std::time::{Duration, Instant};
use thiserror::Error;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

struct Spinner {
    id: ObjectId,
    axis: Vec3,
    speed: f32,
}

fn build_scene(topology: Topology) -> Result<(Scene, Vec<Spinner>), SceneError> {
    let mut scene = Scene::new();
    let mut spinners = Vec::new();

    let cube = scene.add(
        Body::cube(1.2, [0.85, 0.45, 0.2]),
        Transform::from_position(Vec3::new(-1.2, 0.0, 0.0)),
    );
    spinners.push(Spinner {
        id: cube,
        axis: Vec3::new(1.0, 1.0, 0.0),
        speed: 0.8,
    });

    let tetrahedron = scene.add(
        Body::tetrahedron(1.4, [0.2, 0.6, 0.9]),
        Transform::from_position(Vec3::new(1.3, 0.0, 0.0)),
    );
    spinners.push(Spinner {
        id: tetrahedron,
        axis: Vec3::new(0.0, 1.0, 0.3),
        speed: -1.1,
    });

    // Ground grid, only visible as lines or points
    let mut grid_points = Vec::new();
    let mut grid_edges = Vec::new();
    for i in 0..=4 {
        let offset = -2.0 + i as f32;
        let base = grid_points.len();
        grid_points.push(Point3::new(offset, -1.5, -2.0));
        grid_points.push(Point3::new(offset, -1.5, 2.0));
        grid_points.push(Point3::new(-2.0, -1.5, offset));
        grid_points.push(Point3::new(2.0, -1.5, offset));
        grid_edges.push((base, base + 1));
        grid_edges.push((base + 2, base + 3));
    }
    scene.add(
        Wireframe::new(grid_points, grid_edges, [0.4, 0.4, 0.4])?,
        Transform::identity(),
    );

    scene.add(
        Triangle::new(
            [
                Point3::new(-0.5, 1.4, 0.0),
                Point3::new(0.5, 1.4, 0.0),
                Point3::new(0.0, 2.1, 0.0),
            ],
            [0.9, 0.9, 0.3],
        ),
        Transform::identity(),
    );
    scene.add(Point::new(Point3::new(0.0, 0.0, 0.0), [1.0, 1.0, 1.0]), Transform::identity());

    log::info!("Scene built with {} objects for {:?}", scene.len(), topology);
    Ok((scene, spinners))
}

fn load_config() -> Result<EngineConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            EngineConfig::load_from_file(&path)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn run() -> Result<(), DemoError> {
    let config = load_config()?;
    let topology = config.renderer.topology;
    let capacity = config.renderer.max_vertices as usize;

    let (mut scene, spinners) = build_scene(topology)?;
    let mut camera = Camera::perspective(Point3::new(0.0, 1.5, 6.0), Point3::origin(), 45.0, 1.0, 0.1, 100.0);

    let mut engine = Engine::new(&config)?;
    let start = Instant::now();
    let mut uploaded: Vec<Vertex> = Vec::new();
    let mut last_report = Instant::now();

    while !engine.window().should_close() {
        engine.window_mut().poll_events();

        let elapsed = start.elapsed().as_secs_f32();
        for spinner in &spinners {
            if let Some(transform) = scene.transform_mut(spinner.id) {
                let axis = Unit::new_normalize(spinner.axis);
                transform.rotation = Quat::from_axis_angle(&axis, elapsed * spinner.speed);
            }
        }

        let (width, height) = engine.window().get_framebuffer_size();
        camera.fit_extent(width, height);

        let vertices = scene.flatten_bounded(&camera, topology, capacity);
        if vertices != uploaded {
            engine.update_vertices(&vertices)?;
            uploaded = vertices;
        }

        if let FrameOutcome::Skipped = engine.draw_frame()? {
            log::debug!("Frame skipped while the surface was rebuilt");
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let stats = engine.stats();
            log::info!(
                "{} frames presented, {} skipped, {} rebuilds",
                stats.frames_presented,
                stats.frames_skipped,
                stats.adapts
            );
            last_report = Instant::now();
        }
    }

    engine.wait_idle()?;
    log::info!("Shutting down after {:?}", engine.stats());
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = run() {
        log::error!("raster_demo failed: {}", e);
        std::process::exit(1);
    }
}
