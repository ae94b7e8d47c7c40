use super::*;
use crate::navigation::fixed_math::fx;

const LAYER: LayerId = LayerId(0);

fn grid(width: usize, height: usize) -> FlowFieldGrid {
    FlowFieldGrid::new(FlowFieldConfig {
        origin: FixedVec2::ZERO,
        cell_size: FixedNum::ONE,
        width,
        height,
    })
}

fn center_of(grid: &FlowFieldGrid, x: usize, y: usize) -> FixedVec2 {
    grid.config().grid_to_world(x, y)
}

#[test]
fn test_single_goal_costs_are_manhattan_distance() {
    let mut field = grid(5, 5);
    field.add_layer(LAYER, None);
    field.add_goal(LAYER, center_of(&field, 2, 2)).unwrap();
    assert!(field.rebuild_if_needed(LAYER, SimTick(1)).unwrap());

    let cells = field.cells_of(LAYER).unwrap();
    for y in 0..5usize {
        for x in 0..5usize {
            let cell = &cells[y * 5 + x];
            let manhattan = x.abs_diff(2) + y.abs_diff(2);
            assert_eq!(cell.cost, FixedNum::from_num(manhattan), "cell ({}, {})", x, y);
        }
    }
    assert_eq!(cells[12].direction, FixedVec2::ZERO, "goal cell has no direction");
}

#[test]
fn test_directions_point_downhill() {
    let mut field = grid(5, 5);
    field.add_layer(LAYER, None);
    field.add_goal(LAYER, center_of(&field, 2, 2)).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(1)).unwrap();

    let cells = field.cells_of(LAYER).unwrap();
    for y in 0..5i64 {
        for x in 0..5i64 {
            let cell = &cells[(y * 5 + x) as usize];
            if cell.cost == FixedNum::ZERO {
                continue;
            }
            assert_eq!(cell.direction.length(), FixedNum::ONE);
            let nx = x + cell.direction.x.to_num::<i64>();
            let ny = y + cell.direction.y.to_num::<i64>();
            assert!((0..5).contains(&nx) && (0..5).contains(&ny));
            let next = &cells[(ny * 5 + nx) as usize];
            assert!(next.cost < cell.cost, "({}, {}) must point at a cheaper neighbour", x, y);
        }
    }
}

#[test]
fn test_clean_rebuild_is_noop() {
    let mut field = grid(5, 5);
    field.add_layer(LAYER, None);
    field.add_goal(LAYER, center_of(&field, 0, 0)).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(3)).unwrap();

    let snapshot: Vec<FlowCell> = field.cells_of(LAYER).unwrap().to_vec();
    let built_at = field.layer(LAYER).unwrap().last_build_tick;

    assert!(!field.rebuild_if_needed(LAYER, SimTick(50)).unwrap());
    assert_eq!(field.cells_of(LAYER).unwrap(), snapshot.as_slice());
    assert_eq!(field.layer(LAYER).unwrap().last_build_tick, built_at);
    assert_eq!(built_at, Some(SimTick(3)));
}

#[test]
fn test_refresh_interval_makes_layer_due() {
    let mut field = grid(3, 3);
    field.add_layer(LAYER, Some(10));
    field.add_goal(LAYER, center_of(&field, 1, 1)).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(0)).unwrap();

    assert!(!field.rebuild_if_needed(LAYER, SimTick(9)).unwrap());
    assert!(field.rebuild_if_needed(LAYER, SimTick(10)).unwrap());
    assert_eq!(field.layer(LAYER).unwrap().last_build_tick, Some(SimTick(10)));
}

#[test]
fn test_obstacles_keep_sentinel_and_unreached_cells_stay_max() {
    let mut field = grid(5, 1);
    field.add_layer(LAYER, None);
    field.set_obstacle(2, 0, true);
    field.add_goal(LAYER, center_of(&field, 0, 0)).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(1)).unwrap();

    let cells = field.cells_of(LAYER).unwrap();
    assert_eq!(cells[1].cost, fx(1.0));
    assert_eq!(cells[2].cost, OBSTACLE_COST);
    assert_eq!(cells[2].direction, FixedVec2::ZERO);
    for cell in &cells[3..] {
        assert_eq!(cell.cost, UNREACHED_COST);
        assert_eq!(cell.direction, FixedVec2::ZERO);
        assert!(!cell.is_reachable());
    }
}

#[test]
fn test_multiple_goals_seed_together() {
    let mut field = grid(7, 1);
    field.add_layer(LAYER, None);
    field.add_goal(LAYER, center_of(&field, 0, 0)).unwrap();
    field.add_goal(LAYER, center_of(&field, 6, 0)).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(1)).unwrap();

    let costs: Vec<i64> = field.cells_of(LAYER).unwrap().iter().map(|c| c.cost.to_num()).collect();
    assert_eq!(costs, vec![0, 1, 2, 3, 2, 1, 0]);
}

#[test]
fn test_obstacle_change_dirties_every_layer() {
    let mut field = grid(4, 4);
    field.add_layer(LayerId(0), None);
    field.add_layer(LayerId(1), None);
    field.rebuild_if_needed(LayerId(0), SimTick(1)).unwrap();
    field.rebuild_if_needed(LayerId(1), SimTick(1)).unwrap();
    assert!(field.layers().iter().all(|l| !l.dirty));

    field.set_obstacle(1, 1, true);
    assert!(field.layers().iter().all(|l| l.dirty));

    // Setting the same value again is not a change
    field.rebuild_if_needed(LayerId(0), SimTick(2)).unwrap();
    field.set_obstacle(1, 1, true);
    assert!(!field.layer(LayerId(0)).unwrap().dirty);
}

#[test]
fn test_budget_defers_extra_layers() {
    let mut field = grid(4, 4);
    for id in 0..3 {
        field.add_layer(LayerId(id), None);
    }
    let budget = NavBudget { max_flow_field_rebuilds: 2, ..Default::default() };
    let mut counters = BudgetCounters::default();
    counters.reset_for_tick(SimTick(1));

    assert_eq!(field.rebuild_dirty(SimTick(1), &mut counters, &budget), 2);
    assert!(field.layer(LayerId(2)).unwrap().dirty, "deferred layer stays dirty");
    assert_eq!(counters.deferred_work, 1);

    counters.reset_for_tick(SimTick(2));
    assert_eq!(field.rebuild_dirty(SimTick(2), &mut counters, &budget), 1);
    assert!(field.layers().iter().all(|l| !l.dirty));
}

#[test]
fn test_cell_storage_tracks_layer_count() {
    let mut field = grid(6, 4);
    assert_eq!(field.cell_storage_len(), 0);

    field.add_layer(LayerId(5), None);
    field.add_layer(LayerId(9), None);
    field.add_layer(LayerId(5), None);
    assert_eq!(field.layer_count(), 2);
    assert_eq!(field.cell_storage_len(), 2 * 24);

    field.remove_layer(LayerId(5)).unwrap();
    assert_eq!(field.cell_storage_len(), 24);
    assert!(field.cells_of(LayerId(9)).unwrap().iter().all(|c| c.layer == LayerId(9)));
    assert!(matches!(field.remove_layer(LayerId(5)), Err(NavError::UnknownLayer(_))));
}

#[test]
fn test_goal_outside_grid_is_rejected() {
    let mut field = grid(4, 4);
    field.add_layer(LAYER, None);
    assert!(matches!(
        field.add_goal(LAYER, FixedVec2::from_f32(-1.0, 2.0)),
        Err(NavError::OutOfGrid { .. })
    ));
    assert!(matches!(
        field.add_goal(LayerId(7), FixedVec2::from_f32(1.0, 1.0)),
        Err(NavError::UnknownLayer(_))
    ));
}

#[test]
fn test_removing_goal_marks_dirty() {
    let mut field = grid(4, 4);
    field.add_layer(LAYER, None);
    let pos = center_of(&field, 3, 3);
    field.add_goal(LAYER, pos).unwrap();
    field.rebuild_if_needed(LAYER, SimTick(1)).unwrap();

    assert!(field.remove_goal(LAYER, pos).unwrap());
    assert!(field.layer(LAYER).unwrap().dirty);
    assert!(!field.remove_goal(LAYER, pos).unwrap());
}

#[test]
fn test_occupancy_survives_rebuild() {
    let mut field = grid(4, 4);
    field.add_layer(LAYER, None);
    field.refresh_occupancy([FixedVec2::from_f32(1.5, 1.5), FixedVec2::from_f32(100.0, 0.0)]);
    field.rebuild_if_needed(LAYER, SimTick(1)).unwrap();

    let occupied: Vec<usize> = field
        .cells_of(LAYER)
        .unwrap()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.occupied)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(occupied, vec![5]);
}
