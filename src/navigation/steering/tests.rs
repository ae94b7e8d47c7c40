use super::*;
use crate::navigation::config::NavConfig;
use crate::navigation::fixed_math::fx;
use crate::navigation::flow_field::FlowFieldConfig;
use crate::navigation::spatial_hash::SpatialHash;
use crate::navigation::types::SimTick;

const LAYER: LayerId = LayerId(0);

fn settings() -> SteeringSettings {
    NavConfig::default().steering
}

fn agent(id: u32, x: f32, y: f32) -> NavAgent {
    NavAgent::new(AgentId(id), FixedVec2::from_f32(x, y), LAYER)
}

/// 10×1 corridor with its goal in the last cell, so every direction is +x.
fn corridor() -> FlowFieldGrid {
    let mut grid = FlowFieldGrid::new(FlowFieldConfig {
        origin: FixedVec2::ZERO,
        cell_size: FixedNum::ONE,
        width: 10,
        height: 1,
    });
    grid.add_layer(LAYER, None);
    let goal = grid.config().grid_to_world(9, 0);
    grid.add_goal(LAYER, goal).unwrap();
    grid.rebuild_if_needed(LAYER, SimTick(0)).unwrap();
    grid
}

fn index_of(positions: &[FixedVec2]) -> SpatialHash {
    let mut hash = SpatialHash::new(FixedVec2::from_f32(-50.0, -50.0), fx(100.0), fx(100.0), fx(5.0));
    hash.rebuild(positions.iter().copied());
    hash
}

fn neighbors_for(agents: &[NavAgent], threats: &[FixedVec2], settings: &SteeringSettings) -> NeighborCache {
    let positions: Vec<FixedVec2> = agents.iter().map(|a| a.position).collect();
    gather_neighbors(agents, &index_of(&positions), threats, &index_of(threats), settings)
}

fn approx(a: FixedNum, b: f32) -> bool {
    (a.to_num::<f32>() - b).abs() < 0.01
}

#[test]
fn test_follower_caches_last_nonzero_direction() {
    let grid = corridor();
    let mut walker = agent(0, 0.5, 0.5);

    assert_eq!(follow_flow(&mut walker, &grid), FixedVec2::new(FixedNum::ONE, FixedNum::ZERO));

    // The goal cell has no direction; the cached one is kept
    walker.position = FixedVec2::from_f32(9.5, 0.5);
    assert_eq!(follow_flow(&mut walker, &grid), FixedVec2::new(FixedNum::ONE, FixedNum::ZERO));

    // So is leaving the grid entirely
    walker.position = FixedVec2::from_f32(40.0, 40.0);
    assert_eq!(follow_flow(&mut walker, &grid), FixedVec2::new(FixedNum::ONE, FixedNum::ZERO));
}

#[test]
fn test_follower_ignores_unknown_layer() {
    let grid = corridor();
    let mut walker = agent(0, 0.5, 0.5);
    walker.layer = LayerId(7);

    assert_eq!(follow_flow(&mut walker, &grid), FixedVec2::ZERO);
}

#[test]
fn test_separation_pushes_away_inside_radius_only() {
    let origin = FixedVec2::ZERO;

    let push = inverse_square_repulsion(origin, [FixedVec2::from_f32(1.0, 0.0)], fx(1.5));
    assert!(push.x < FixedNum::ZERO);
    assert_eq!(push.y, FixedNum::ZERO);
    assert!(approx(push.x, -1.0));

    let none = inverse_square_repulsion(origin, [FixedVec2::from_f32(2.0, 0.0)], fx(1.5));
    assert_eq!(none, FixedVec2::ZERO);
}

#[test]
fn test_close_neighbors_push_harder_but_bounded() {
    let origin = FixedVec2::ZERO;
    let near = inverse_square_repulsion(origin, [FixedVec2::from_f32(0.1, 0.0)], fx(1.5));
    let far = inverse_square_repulsion(origin, [FixedVec2::from_f32(1.0, 0.0)], fx(1.5));

    assert!(near.length() > far.length());
    // Distance floor of 0.5 caps the push at 4
    assert!(approx(near.length(), 4.0));

    let coincident = inverse_square_repulsion(origin, [origin], fx(1.5));
    assert_eq!(coincident, FixedVec2::ZERO);
}

#[test]
fn test_cohesion_points_at_centroid() {
    let pull = cohesion(
        FixedVec2::ZERO,
        [FixedVec2::from_f32(2.0, 0.0), FixedVec2::from_f32(0.0, 2.0)],
    );
    assert_eq!(pull.x, pull.y);
    assert!(approx(pull.x, std::f32::consts::FRAC_1_SQRT_2));

    assert_eq!(cohesion(FixedVec2::ZERO, std::iter::empty()), FixedVec2::ZERO);
}

#[test]
fn test_neighbor_gather_keeps_closest() {
    let mut settings = settings();
    settings.max_neighbors = 2;
    let agents = vec![
        agent(0, 0.0, 0.0),
        agent(1, 3.0, 0.0),
        agent(2, 1.0, 0.0),
        agent(3, 2.0, 0.0),
        agent(4, 30.0, 0.0),
    ];

    let cache = neighbors_for(&agents, &[], &settings);
    assert_eq!(cache.agents[0].as_slice(), &[2, 3]);
    assert!(cache.agents[4].is_empty(), "outside neighbor radius");
    assert!(cache.threats.iter().all(|t| t.is_empty()));
}

#[test]
fn test_isolated_agent_moves_along_flow_at_scaled_speed() {
    let grid = corridor();
    let settings = settings();
    let mut agents = vec![agent(0, 0.5, 0.5)];
    agents[0].speed_scalar = fx(2.0);
    let cache = neighbors_for(&agents, &[], &settings);

    assert_eq!(steer_agents(&mut agents, &grid, &cache, &[], &settings), 1);

    let velocity = agents[0].desired_velocity;
    let expected: f32 = (settings.base_speed * fx(2.0)).to_num();
    assert!(approx(velocity.x, expected));
    assert_eq!(velocity.y, FixedNum::ZERO);
}

#[test]
fn test_threat_bends_path_away() {
    let grid = corridor();
    let settings = settings();
    let mut agents = vec![agent(0, 0.5, 0.5)];
    let threats = vec![FixedVec2::from_f32(0.5, 1.5)];
    let cache = neighbors_for(&agents, &threats, &settings);
    assert_eq!(cache.threats[0].as_slice(), &[0]);

    steer_agents(&mut agents, &grid, &cache, &threats, &settings);

    let velocity = agents[0].desired_velocity;
    assert!(velocity.x > FixedNum::ZERO, "still heading downstream");
    assert!(velocity.y < FixedNum::ZERO, "pushed away from the threat");
}

#[test]
fn test_group_members_are_left_to_formation() {
    let grid = corridor();
    let settings = settings();
    let mut agents = vec![agent(0, 0.5, 0.5), agent(1, 1.5, 0.5)];
    agents[1].group = Some(GroupId(1));
    let cache = neighbors_for(&agents, &[], &settings);

    assert_eq!(steer_agents(&mut agents, &grid, &cache, &[], &settings), 1);
    assert_eq!(agents[1].desired_velocity, FixedVec2::ZERO);
    assert_eq!(agents[1].cached_direction, FixedVec2::ZERO);
}

#[test]
fn test_parallel_steering_is_deterministic() {
    let grid = corridor();
    let settings = settings();
    let agents: Vec<NavAgent> = (0..64)
        .map(|i| {
            let mut a = agent(i, (i % 8) as f32 * 0.7, 0.2 + (i / 8) as f32 * 0.1);
            a.kind = AgentKind((i % 3) as u16);
            a
        })
        .collect();
    let threats = vec![FixedVec2::from_f32(3.0, 0.5)];
    let cache = neighbors_for(&agents, &threats, &settings);

    let mut first = agents.clone();
    let mut second = agents;
    steer_agents(&mut first, &grid, &cache, &threats, &settings);
    steer_agents(&mut second, &grid, &cache, &threats, &settings);

    assert_eq!(first, second);
}
