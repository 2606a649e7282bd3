use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sim::math::FixedNum;

/// Static configuration loaded once at startup from `assets/world_config.ron`.
/// These values define fundamental simulation parameters that must not change
/// during a session (tick rate, world size, navigation budgets). Changing them
/// mid-session would break deterministic replay.
#[derive(Resource, Deserialize, Serialize, Clone, Debug)]
pub struct WorldConfig {
    // Simulation (deterministic, must not change mid-session)
    pub tick_rate: f64,
    pub world_width: u32,
    pub world_height: u32,
    pub block_size: u32,
    pub agent_speed: f32,
    pub agent_box_size: f32,
    pub epsilon: f32,

    // Navigation
    pub waypoint_radius_sq: f32,
    pub revalidate_interval_secs: f64,
    pub nav_queue_budget_ms: f64,
    pub shortcut_hull_scale: f32,

    // Enclosedness sampling
    pub enclosure_samples: usize,

    // World generation
    pub world_seed: u64,

    // Demo driver
    pub demo_agents: usize,
    pub demo_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            world_width: 256,
            world_height: 256,
            block_size: 16,
            agent_speed: 4.0,
            agent_box_size: 0.6,
            epsilon: 0.0001,
            waypoint_radius_sq: 0.25,
            revalidate_interval_secs: 1.0,
            nav_queue_budget_ms: 8.0,
            shortcut_hull_scale: 0.95,
            enclosure_samples: 16,
            world_seed: 0x5EED,
            demo_agents: 64,
            demo_ticks: 600,
        }
    }
}

/// Runtime simulation configuration with fixed-point values for deterministic
/// navigation and collision math.
///
/// All physics-facing parameters are converted from [`WorldConfig`] (f32/f64)
/// to [`FixedNum`] exactly once when the config is loaded. Keeping the config
/// layer in floats means human-readable RON files (`agent_speed: 4.0`) with a
/// single conversion point, and a clear boundary between the config layer and
/// the simulation layer.
#[derive(Resource, Clone, Debug)]
pub struct SimConfig {
    pub tick_rate: f64,
    /// Seconds per tick as a fixed-point value, the movement integration step.
    pub tick_dt: FixedNum,
    pub world_width: u32,
    pub world_height: u32,
    pub block_size: u32,
    pub agent_speed: FixedNum,
    pub agent_box_size: FixedNum,
    pub epsilon: FixedNum,
    pub waypoint_radius_sq: FixedNum,
    pub revalidate_interval: Duration,
    pub nav_queue_budget: Duration,
    pub shortcut_hull_scale: FixedNum,
    pub enclosure_samples: usize,
    pub world_seed: u64,
}

impl SimConfig {
    pub fn from_world_config(config: &WorldConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            tick_dt: FixedNum::from_num(1.0 / config.tick_rate),
            world_width: config.world_width,
            world_height: config.world_height,
            block_size: config.block_size,
            agent_speed: FixedNum::from_num(config.agent_speed),
            agent_box_size: FixedNum::from_num(config.agent_box_size),
            epsilon: FixedNum::from_num(config.epsilon),
            waypoint_radius_sq: FixedNum::from_num(config.waypoint_radius_sq),
            revalidate_interval: Duration::from_secs_f64(config.revalidate_interval_secs),
            nav_queue_budget: Duration::from_secs_f64(config.nav_queue_budget_ms / 1000.0),
            shortcut_hull_scale: FixedNum::from_num(config.shortcut_hull_scale),
            enclosure_samples: config.enclosure_samples,
            world_seed: config.world_seed,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_world_config(&WorldConfig::default())
    }
}

pub struct WorldConfigPlugin;

impl Plugin for WorldConfigPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimConfig>();
        app.add_systems(PreStartup, load_world_config);
    }
}

/// Load static configuration synchronously at startup. This must complete
/// before anything that sizes the world or the navigation budgets.
fn load_world_config(mut commands: Commands, mut sim_config: ResMut<SimConfig>) {
    let config_path = "assets/world_config.ron";

    let config = match std::fs::read_to_string(config_path) {
        Ok(contents) => match ron::from_str::<WorldConfig>(&contents) {
            Ok(config) => {
                info!("Loaded world config from {}", config_path);
                config
            }
            Err(e) => {
                error!("Failed to parse world config: {}", e);
                error!("Using default WorldConfig");
                WorldConfig::default()
            }
        },
        Err(e) => {
            error!("Failed to read {}: {}", config_path, e);
            error!("Using default WorldConfig");
            WorldConfig::default()
        }
    };

    *sim_config = SimConfig::from_world_config(&config);
    commands.insert_resource(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_ron() {
        let config = WorldConfig::default();
        let text = ron::to_string(&config).expect("serialize");
        let back: WorldConfig = ron::from_str(&text).expect("deserialize");
        assert_eq!(back.world_width, config.world_width);
        assert_eq!(back.tick_rate, config.tick_rate);
    }

    #[test]
    fn sim_config_converts_budget_to_duration() {
        let mut config = WorldConfig::default();
        config.nav_queue_budget_ms = 8.0;
        let sim = SimConfig::from_world_config(&config);
        assert_eq!(sim.nav_queue_budget, Duration::from_millis(8));
    }
}
