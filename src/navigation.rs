//! Hierarchical multi-modal navigation.
//!
//! Long-range questions ("which regions and transports get me there?") go to
//! the meta-graph planner; short-range ones go to local A*; crowds sharing a
//! destination read a flow field instead of searching at all. Everything runs
//! inside [`NavWorld::tick`] under per-tick budgets.
//!
//! ## Module layout
//!
//! - `graph`: local / region / transit graphs and their incremental builders
//! - `astar`, `planner`, `segment_builder`: the search tiers
//! - `intake`: request arena, tiering and dispatch
//! - `flow_field`, `steering`, `formation`: crowd movement
//! - `budget`, `replan`: per-tick limits, stagger and route monitoring
//! - `world`, `commands`: the tick orchestrator and its end-of-tick queue

use bevy::prelude::*;

pub mod astar;
pub mod budget;
pub mod commands;
pub mod config;
pub mod error;
pub mod fixed_math;
pub mod flow_field;
pub mod formation;
pub mod graph;
pub mod intake;
pub mod path;
pub mod planner;
pub mod preference;
pub mod replan;
pub mod segment_builder;
pub mod spatial_hash;
pub mod steering;
pub mod types;
pub mod world;

pub use budget::{BudgetCounters, NavBudget};
pub use commands::NavCommand;
pub use config::{InitialNavConfig, NavConfig, DEFAULT_CONFIG_PATH};
pub use error::{NavError, NavResult};
pub use fixed_math::{FixedNum, FixedVec2, FixedVec3};
pub use graph::{GraphHierarchy, LocalGraph, RegionLayout, TransportNetwork};
pub use path::{NavPath, NavPathSegment, SegmentKind};
pub use preference::{NavPreference, RequesterRole};
pub use steering::{AgentKind, NavAgent};
pub use types::*;
pub use world::{NavStats, NavWorld, WorldChange};

/// In-memory world data the navigation core reads from each tick.
#[derive(Resource, Default)]
pub struct NavWorldModel {
    pub regions: RegionLayout,
    pub transports: TransportNetwork,
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum NavSet {
    /// One [`NavWorld::tick`] per fixed step.
    Advance,
}

pub struct NavigationPlugin {
    pub config_path: String,
}

impl Default for NavigationPlugin {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
        }
    }
}

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        let initial = InitialNavConfig::load_or_default(&self.config_path);
        let config = NavConfig::from(&initial);

        app.insert_resource(initial);
        app.insert_resource(NavWorld::new(config, LocalGraph::new()));
        app.init_resource::<NavWorldModel>();

        app.configure_sets(FixedUpdate, NavSet::Advance);
        app.add_systems(FixedUpdate, advance_navigation.in_set(NavSet::Advance));
    }
}

/// Run one navigation tick per fixed step.
pub fn advance_navigation(time: Res<Time>, model: Res<NavWorldModel>, mut world: ResMut<NavWorld>) {
    world.set_delta(FixedNum::from_num(time.delta_secs()));
    if let Some(stats) = world.tick(&model.regions, &model.transports) {
        if stats.tick % 100 == 0 {
            debug!(
                "[NAV] tick {} | graph v{} | queue {} | dropped {} | deferred {}",
                stats.tick, stats.graph_version, stats.queue_size, stats.dropped_requests, stats.deferred_work
            );
        }
    }
}
