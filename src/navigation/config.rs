use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::budget::NavBudget;
use super::error::{NavError, NavResult};
use super::fixed_math::{FixedNum, FixedVec2};
use super::flow_field::FlowFieldConfig;
use super::preference::{NavPreference, PreferenceProfiles, RequesterRole};

/// Default location of the navigation config file.
pub const DEFAULT_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Navigation parameters as written in `nav_config.ron`.
///
/// Values are plain floats so the file stays human-editable; they are
/// converted exactly once into the fixed-point [`NavConfig`]. Changing them
/// mid-run breaks determinism between simulations that loaded different files.
#[derive(Resource, Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct InitialNavConfig {
    // Budgets
    pub max_local_path_queries_per_tick: u32,
    pub max_strategic_route_plans_per_tick: u32,
    pub max_flow_field_rebuilds_per_tick: u32,
    pub queue_warning_threshold: usize,

    // Stagger cadences
    pub warm_period: u64,
    pub replan_period: u64,

    // Planning
    pub strategic_distance_threshold: f32,
    pub max_astar_iterations: usize,
    pub local_refine_range: f32,
    pub replan_on_version_change: bool,

    // Flow field grid
    pub flow_origin_x: f32,
    pub flow_origin_y: f32,
    pub flow_cell_size: f32,
    pub flow_width: usize,
    pub flow_height: usize,
    pub flow_refresh_interval: Option<u64>,

    // Steering
    pub base_speed: f32,
    pub flow_weight: f32,
    pub separation_weight: f32,
    pub avoidance_weight: f32,
    pub cohesion_weight: f32,
    pub neighbor_radius: f32,
    pub separation_radius: f32,
    pub avoidance_radius: f32,
    pub max_neighbors: usize,

    // Group formation
    pub formation_near_radius: f32,
    pub formation_spacing: f32,
    pub group_arrival_radius: f32,

    // Preference profiles per requester role
    pub profiles: Vec<RoleProfileConfig>,
}

/// One preference profile entry in the config file.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RoleProfileConfig {
    pub role: RequesterRole,
    pub time: f32,
    pub fuel: f32,
    pub risk: f32,
    pub allow_paid: bool,
}

impl Default for InitialNavConfig {
    fn default() -> Self {
        Self {
            max_local_path_queries_per_tick: 64,
            max_strategic_route_plans_per_tick: 4,
            max_flow_field_rebuilds_per_tick: 2,
            queue_warning_threshold: 512,
            warm_period: 4,
            replan_period: 10,
            strategic_distance_threshold: 100.0,
            max_astar_iterations: 100_000,
            local_refine_range: 60.0,
            replan_on_version_change: false,
            flow_origin_x: 0.0,
            flow_origin_y: 0.0,
            flow_cell_size: 1.0,
            flow_width: 128,
            flow_height: 128,
            flow_refresh_interval: None,
            base_speed: 5.0,
            flow_weight: 1.0,
            separation_weight: 1.5,
            avoidance_weight: 2.0,
            cohesion_weight: 0.5,
            neighbor_radius: 5.0,
            separation_radius: 1.5,
            avoidance_radius: 4.0,
            max_neighbors: 8,
            formation_near_radius: 8.0,
            formation_spacing: 2.0,
            group_arrival_radius: 3.0,
            profiles: RequesterRole::ALL
                .iter()
                .map(|&role| {
                    let p = NavPreference::default_for(role);
                    RoleProfileConfig {
                        role,
                        time: p.time.to_num(),
                        fuel: p.fuel.to_num(),
                        risk: p.risk.to_num(),
                        allow_paid: p.allow_paid,
                    }
                })
                .collect(),
        }
    }
}

impl InitialNavConfig {
    /// Read and parse a RON config file.
    pub fn try_load(path: &str) -> NavResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| NavError::ConfigRead {
            path: path.to_string(),
            source,
        })?;
        ron::from_str::<InitialNavConfig>(&contents).map_err(|source| NavError::ConfigParse {
            path: path.to_string(),
            source,
        })
    }

    /// Load from `path`, falling back to defaults (and logging why) on failure.
    pub fn load_or_default(path: &str) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                info!("Loaded navigation config from {}", path);
                config
            }
            Err(e) => {
                error!("{}", e);
                error!("Using default InitialNavConfig");
                Self::default()
            }
        }
    }
}

/// Knobs for the planners and the replanning monitor.
#[derive(Clone, Debug)]
pub struct PlannerSettings {
    pub strategic_distance_threshold: FixedNum,
    pub max_astar_iterations: usize,
    pub local_refine_range: FixedNum,
    pub replan_on_version_change: bool,
}

/// Stagger periods, in ticks. A period of 0 or 1 means "every tick".
#[derive(Clone, Copy, Debug)]
pub struct StaggerSettings {
    pub warm_period: u64,
    pub replan_period: u64,
}

#[derive(Clone, Debug)]
pub struct SteeringSettings {
    pub base_speed: FixedNum,
    pub flow_weight: FixedNum,
    pub separation_weight: FixedNum,
    pub avoidance_weight: FixedNum,
    pub cohesion_weight: FixedNum,
    pub neighbor_radius: FixedNum,
    pub separation_radius: FixedNum,
    pub avoidance_radius: FixedNum,
    pub max_neighbors: usize,
}

#[derive(Clone, Debug)]
pub struct FormationSettings {
    pub near_radius: FixedNum,
    pub spacing: FixedNum,
    pub arrival_radius: FixedNum,
}

/// Fixed-point navigation configuration, the single source of tuning values
/// for every phase of [`NavWorld`](super::NavWorld).
#[derive(Clone, Debug)]
pub struct NavConfig {
    pub budget: NavBudget,
    pub stagger: StaggerSettings,
    pub planner: PlannerSettings,
    pub flow_field: FlowFieldConfig,
    pub flow_refresh_interval: Option<u64>,
    pub steering: SteeringSettings,
    pub formation: FormationSettings,
    pub profiles: PreferenceProfiles,
}

impl From<&InitialNavConfig> for NavConfig {
    fn from(initial: &InitialNavConfig) -> Self {
        let fx = |v: f32| FixedNum::from_num(v);

        let mut profiles = PreferenceProfiles::default();
        for entry in &initial.profiles {
            profiles.set_profile(
                entry.role,
                NavPreference {
                    time: fx(entry.time),
                    fuel: fx(entry.fuel),
                    risk: fx(entry.risk),
                    allow_paid: entry.allow_paid,
                },
            );
        }

        Self {
            budget: NavBudget {
                max_local_path_queries: initial.max_local_path_queries_per_tick,
                max_strategic_route_plans: initial.max_strategic_route_plans_per_tick,
                max_flow_field_rebuilds: initial.max_flow_field_rebuilds_per_tick,
                queue_warning_threshold: initial.queue_warning_threshold,
            },
            stagger: StaggerSettings {
                warm_period: initial.warm_period,
                replan_period: initial.replan_period,
            },
            planner: PlannerSettings {
                strategic_distance_threshold: fx(initial.strategic_distance_threshold),
                max_astar_iterations: initial.max_astar_iterations,
                local_refine_range: fx(initial.local_refine_range),
                replan_on_version_change: initial.replan_on_version_change,
            },
            flow_field: FlowFieldConfig {
                origin: FixedVec2::from_f32(initial.flow_origin_x, initial.flow_origin_y),
                cell_size: fx(initial.flow_cell_size),
                width: initial.flow_width,
                height: initial.flow_height,
            },
            flow_refresh_interval: initial.flow_refresh_interval,
            steering: SteeringSettings {
                base_speed: fx(initial.base_speed),
                flow_weight: fx(initial.flow_weight),
                separation_weight: fx(initial.separation_weight),
                avoidance_weight: fx(initial.avoidance_weight),
                cohesion_weight: fx(initial.cohesion_weight),
                neighbor_radius: fx(initial.neighbor_radius),
                separation_radius: fx(initial.separation_radius),
                avoidance_radius: fx(initial.avoidance_radius),
                max_neighbors: initial.max_neighbors,
            },
            formation: FormationSettings {
                near_radius: fx(initial.formation_near_radius),
                spacing: fx(initial.formation_spacing),
                arrival_radius: fx(initial.group_arrival_radius),
            },
            profiles,
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        NavConfig::from(&InitialNavConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let parsed: InitialNavConfig =
            ron::from_str("(max_strategic_route_plans_per_tick: 1, flow_width: 5)").expect("config should parse");

        assert_eq!(parsed.max_strategic_route_plans_per_tick, 1);
        assert_eq!(parsed.flow_width, 5);
        assert_eq!(parsed.flow_height, 128, "unspecified fields fall back to defaults");

        let config = NavConfig::from(&parsed);
        assert_eq!(config.budget.max_strategic_route_plans, 1);
        assert_eq!(config.flow_field.cell_count(), 5 * 128);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let result = InitialNavConfig::try_load("does/not/exist.ron");
        assert!(matches!(result, Err(NavError::ConfigRead { .. })));

        let config = InitialNavConfig::load_or_default("does/not/exist.ron");
        assert_eq!(config.queue_warning_threshold, InitialNavConfig::default().queue_warning_threshold);
    }

    #[test]
    fn test_profiles_convert_per_role() {
        let config = NavConfig::default();
        for role in RequesterRole::ALL {
            assert_eq!(config.profiles.profile(role), NavPreference::default_for(role));
        }
    }
}
