use super::*;
use crate::navigation::fixed_math::fx;
use crate::navigation::types::PathStatus;

const MAX_ITER: usize = 10_000;

/// (0,0,0) - (5,0,0) - (10,0,0), unit-cost bidirectional edges.
fn chain_graph(mode: LocomotionMode) -> LocalGraph {
    let mut graph = LocalGraph::new();
    let n0 = graph.add_node(FixedVec3::from_f32(0.0, 0.0, 0.0), FixedNum::ZERO);
    let n1 = graph.add_node(FixedVec3::from_f32(5.0, 0.0, 0.0), FixedNum::ZERO);
    let n2 = graph.add_node(FixedVec3::from_f32(10.0, 0.0, 0.0), FixedNum::ZERO);
    graph.add_edge(n0, n1, fx(1.0), mode, true).unwrap();
    graph.add_edge(n1, n2, fx(1.0), mode, true).unwrap();
    graph
}

/// 4-connected grid of nodes spaced 1 unit apart, edge cost 1.
fn grid_graph(width: u32, height: u32) -> LocalGraph {
    let mut graph = LocalGraph::new();
    for y in 0..height {
        for x in 0..width {
            graph.add_node(FixedVec3::from_f32(x as f32, y as f32, 0.0), FixedNum::ZERO);
        }
    }
    for y in 0..height {
        for x in 0..width {
            let id = NodeId(y * width + x);
            if x + 1 < width {
                graph.add_edge(id, NodeId(id.0 + 1), fx(1.0), LocomotionMode::GROUND, true).unwrap();
            }
            if y + 1 < height {
                graph.add_edge(id, NodeId(id.0 + width), fx(1.0), LocomotionMode::GROUND, true).unwrap();
            }
        }
    }
    graph
}

#[test]
fn test_chain_path_and_cost() {
    let graph = chain_graph(LocomotionMode::GROUND);
    let result = find_path(
        &graph,
        FixedVec3::from_f32(0.0, 0.0, 0.0),
        FixedVec3::from_f32(10.0, 0.0, 0.0),
        LocomotionMode::GROUND,
        MAX_ITER,
    );

    assert_eq!(result.status, PathStatus::Success);
    let nodes: Vec<_> = result.waypoints.iter().map(|w| w.node).collect();
    assert_eq!(nodes, vec![NodeId(0), NodeId(1), NodeId(2)]);
    let costs: Vec<_> = result.waypoints.iter().map(|w| w.cost).collect();
    assert_eq!(costs, vec![fx(0.0), fx(1.0), fx(2.0)]);
    assert_eq!(result.total_cost(), fx(2.0));
}

#[test]
fn test_start_equals_goal_after_snapping() {
    let graph = chain_graph(LocomotionMode::GROUND);
    // Both points snap onto node 1
    let result = find_path(
        &graph,
        FixedVec3::from_f32(4.0, 0.5, 0.0),
        FixedVec3::from_f32(6.0, -0.5, 0.0),
        LocomotionMode::GROUND,
        MAX_ITER,
    );

    assert_eq!(result.status, PathStatus::Success);
    assert_eq!(result.waypoints.len(), 1);
    assert_eq!(result.waypoints[0].node, NodeId(1));
    assert_eq!(result.total_cost(), FixedNum::ZERO);
}

#[test]
fn test_mode_mask_refuses_edges_regardless_of_cost() {
    let graph = chain_graph(LocomotionMode::WATER);
    let result = find_path(
        &graph,
        FixedVec3::from_f32(0.0, 0.0, 0.0),
        FixedVec3::from_f32(10.0, 0.0, 0.0),
        LocomotionMode::GROUND | LocomotionMode::AIR,
        MAX_ITER,
    );
    assert_eq!(result.status, PathStatus::Failed(FailureReason::SearchExhausted));

    // Any overlapping bit is enough
    let result = find_path(
        &graph,
        FixedVec3::from_f32(0.0, 0.0, 0.0),
        FixedVec3::from_f32(10.0, 0.0, 0.0),
        LocomotionMode::GROUND | LocomotionMode::WATER,
        MAX_ITER,
    );
    assert_eq!(result.status, PathStatus::Success);
}

#[test]
fn test_cheaper_mode_restricted_shortcut_is_ignored() {
    // Two routes from a to c: a water-only shortcut (cost 0.1) and a ground detour
    let mut graph = LocalGraph::new();
    let a = graph.add_node(FixedVec3::from_f32(0.0, 0.0, 0.0), FixedNum::ZERO);
    let b = graph.add_node(FixedVec3::from_f32(0.0, 5.0, 0.0), FixedNum::ZERO);
    let c = graph.add_node(FixedVec3::from_f32(10.0, 0.0, 0.0), FixedNum::ZERO);
    graph.add_edge(a, c, fx(0.1), LocomotionMode::WATER, true).unwrap();
    graph.add_edge(a, b, fx(6.0), LocomotionMode::GROUND, true).unwrap();
    graph.add_edge(b, c, fx(6.0), LocomotionMode::GROUND, true).unwrap();

    let result = find_path_between(&graph, a, c, LocomotionMode::GROUND, MAX_ITER);
    let nodes: Vec<_> = result.waypoints.iter().map(|w| w.node).collect();
    assert_eq!(nodes, vec![a, b, c]);
    assert_eq!(result.total_cost(), fx(12.0));
}

#[test]
fn test_node_base_cost_is_added_on_entry() {
    let mut graph = LocalGraph::new();
    let n0 = graph.add_node(FixedVec3::from_f32(0.0, 0.0, 0.0), fx(100.0));
    let n1 = graph.add_node(FixedVec3::from_f32(5.0, 0.0, 0.0), fx(2.0));
    let n2 = graph.add_node(FixedVec3::from_f32(10.0, 0.0, 0.0), fx(3.0));
    graph.add_edge(n0, n1, fx(1.0), LocomotionMode::GROUND, true).unwrap();
    graph.add_edge(n1, n2, fx(1.0), LocomotionMode::GROUND, true).unwrap();

    let result = find_path_between(&graph, n0, n2, LocomotionMode::GROUND, MAX_ITER);
    // Start node's own base cost is not paid: (1 + 2) + (1 + 3)
    assert_eq!(result.total_cost(), fx(7.0));
}

#[test]
fn test_obstacle_node_is_routed_around() {
    let mut graph = grid_graph(5, 5);
    // Wall across x = 2 except the top row
    for y in 0..4 {
        graph.set_obstacle(NodeId(y * 5 + 2), true).unwrap();
    }

    let result = find_path_between(&graph, NodeId(0), NodeId(4), LocomotionMode::GROUND, MAX_ITER);
    assert_eq!(result.status, PathStatus::Success);
    assert!(result.waypoints.iter().all(|w| w.node != NodeId(2)));
    assert!(result.waypoints.iter().any(|w| w.node == NodeId(22)), "must pass the gap at (2, 4)");
    // 4 up, 4 across, 4 down
    assert_eq!(result.total_cost(), fx(12.0));
}

#[test]
fn test_unreachable_goal_fails() {
    let mut graph = chain_graph(LocomotionMode::GROUND);
    let isolated = graph.add_node(FixedVec3::from_f32(50.0, 0.0, 0.0), FixedNum::ZERO);

    let result = find_path_between(&graph, NodeId(0), isolated, LocomotionMode::GROUND, MAX_ITER);
    assert_eq!(result.status, PathStatus::Failed(FailureReason::SearchExhausted));
    assert!(result.waypoints.is_empty());
}

#[test]
fn test_empty_graph_has_no_snap_node() {
    let graph = LocalGraph::new();
    let result = find_path(&graph, FixedVec3::ZERO, FixedVec3::ZERO, LocomotionMode::GROUND, MAX_ITER);
    assert_eq!(result.status, PathStatus::Failed(FailureReason::NoSnapNode));
}

#[test]
fn test_iteration_cap_reports_exhaustion() {
    let graph = grid_graph(20, 20);
    let result = find_path_between(&graph, NodeId(0), NodeId(399), LocomotionMode::GROUND, 5);
    assert_eq!(result.status, PathStatus::Failed(FailureReason::SearchExhausted));
}

#[test]
fn test_grid_path_is_manhattan_optimal() {
    let graph = grid_graph(10, 10);
    let result = find_path_between(&graph, NodeId(0), NodeId(99), LocomotionMode::GROUND, MAX_ITER);
    assert_eq!(result.total_cost(), fx(18.0));
    assert_eq!(result.waypoints.len(), 19);
}
