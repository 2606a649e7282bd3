use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use borough::sim::config::{SimConfig, WorldConfig};
use borough::sim::collision::{Collider, CollisionModel};
use borough::sim::math::{FixedNum, FixedVec2};
use borough::sim::simulation::components::{
    Agent, NavigateTo, NavigatorHandle, SimCollider, SimPosition, SimPositionPrev, StaticBlocker,
};
use borough::sim::simulation::{Bodies, SimTick, WorldRes};
use borough::sim::routing::navigator::Navigators;
use borough::sim::SimPlugin;

fn setup_file_logging() -> String {
    // Create logs directory if it doesn't exist
    let log_dir = PathBuf::from("logs");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir).expect("Failed to create logs directory");
    }

    // Clean up old log files, keeping only the last 25
    cleanup_old_logs(&log_dir, 25);

    // Generate timestamped filename
    let now = chrono::Local::now();
    let log_filename = format!("borough_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_file_path = log_dir.join(&log_filename);
    let log_path_str = log_file_path.to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(
        Rotation::NEVER, // Don't rotate during a single run
        &log_dir,
        &log_filename,
    );

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false); // No ANSI colors in file

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,borough=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("borough") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Sort by modified time (oldest first)
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

/// Seeded randomness for the demo driver, separate from world generation so
/// reseeding one does not shift the other.
#[derive(Resource)]
struct DemoRng(StdRng);

fn main() {
    let log_file = setup_file_logging();

    println!("Borough spatial core - logging to {}", log_file);

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        )
        .add_plugins(SimPlugin)
        .add_systems(PostStartup, spawn_demo_population)
        .add_systems(Update, (issue_demo_orders, exit_when_demo_done))
        .run();
}

/// Scatter agents and a few parked blockers over open ground.
fn spawn_demo_population(
    mut commands: Commands,
    config: Res<WorldConfig>,
    sim_config: Res<SimConfig>,
    map: Res<WorldRes>,
    bodies: Res<Bodies>,
) {
    let mut rng = StdRng::seed_from_u64(config.world_seed.wrapping_add(1));
    let agent_size = FixedVec2::new(sim_config.agent_box_size, sim_config.agent_box_size);

    let mut spawned = 0usize;
    while spawned < config.demo_agents {
        let tx = rng.random_range(0..config.world_width);
        let ty = rng.random_range(0..config.world_height);
        if map.0.is_solid(&bodies.0, tx, ty) {
            continue;
        }
        let pos = map.0.tile_center(tx, ty);
        commands.spawn((
            SimPosition(pos),
            SimPositionPrev(pos),
            Agent {
                speed: sim_config.agent_speed,
            },
            SimCollider(Collider {
                size: agent_size,
                offset: FixedVec2::ZERO,
                model: CollisionModel::Repel,
            }),
        ));
        spawned += 1;
    }

    let mut blockers = 0usize;
    while blockers < config.demo_agents / 8 {
        let tx = rng.random_range(0..config.world_width);
        let ty = rng.random_range(0..config.world_height);
        if map.0.is_solid(&bodies.0, tx, ty) {
            continue;
        }
        commands.spawn((
            SimPosition(map.0.tile_center(tx, ty)),
            SimCollider(Collider {
                size: FixedVec2::new(FixedNum::from_num(1), FixedNum::from_num(1)),
                offset: FixedVec2::ZERO,
                model: CollisionModel::Box,
            }),
            StaticBlocker,
        ));
        blockers += 1;
    }

    commands.insert_resource(DemoRng(rng));
    info!(
        "[DEMO] spawned {} agents and {} blockers",
        spawned, blockers
    );
}

/// Hand every idle agent a fresh random destination.
fn issue_demo_orders(
    mut orders: MessageWriter<NavigateTo>,
    mut rng: Option<ResMut<DemoRng>>,
    config: Res<WorldConfig>,
    navigators: Res<Navigators>,
    agents: Query<(Entity, Option<&NavigatorHandle>), With<Agent>>,
) {
    let Some(rng) = rng.as_mut() else {
        return;
    };
    for (entity, handle) in &agents {
        let idle = match handle {
            Some(handle) => navigators.has_ended(handle.0),
            None => true,
        };
        if !idle {
            continue;
        }
        let target = FixedVec2::new(
            FixedNum::from_num(rng.0.random_range(0.0..config.world_width as f64)),
            FixedNum::from_num(rng.0.random_range(0.0..config.world_height as f64)),
        );
        orders.write(NavigateTo { entity, target });
    }
}

fn exit_when_demo_done(
    tick: Res<SimTick>,
    config: Res<WorldConfig>,
    mut app_exit: MessageWriter<AppExit>,
) {
    if tick.0 >= config.demo_ticks {
        info!("[DEMO] finished after {} ticks", tick.0);
        app_exit.write(AppExit::Success);
    }
}
