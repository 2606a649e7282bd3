use bevy::prelude::*;

pub mod collision;
pub mod config;
pub mod math;
pub mod routing;
pub mod simulation;
pub mod trace;
pub mod world;

use config::WorldConfigPlugin;
use simulation::SimulationPlugin;

/// Everything the spatial core needs: config loading, world construction,
/// movement, collision, and routing. Headless; rendering and AI layers plug
/// in on top by reading `SimPosition` and sending `NavigateTo` orders.
pub struct SimPlugin;

impl Plugin for SimPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((WorldConfigPlugin, SimulationPlugin));
    }
}
