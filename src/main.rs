use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::smallvec;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayfarer::navigation::graph::{Aabb, BiomeTag, TransitKind, TransportEntity};
use wayfarer::navigation::{
    AgentId, AgentKind, FixedNum, FixedVec2, FixedVec3, GroupId, HeatTier, InitialNavConfig, LayerId, LocalGraph,
    LocomotionMode, NavAgent, NavCommand, NavConfig, NavResult, NavWorld, NodeId, PathRequest, RegionId, RegionLayout,
    Requester, RequesterRole, TransportNetwork, TransportRef, WorldChange, DEFAULT_CONFIG_PATH,
};

const SEED: u64 = 0x5EED;
const DEFAULT_TICKS: u64 = 1_000;
const AGENT_COUNT: u32 = 400;
const GROUP_COUNT: u32 = 2;
const GROUP_SIZE: u32 = 6;
const REGION_SIZE: f32 = 32.0;
const FERRY: TransportRef = TransportRef(1);
const CROWD_LAYER: LayerId = LayerId(0);

fn setup_file_logging() -> std::io::Result<String> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep only the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("wayfarer_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wayfarer=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(log_path_str)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.starts_with("wayfarer") && s.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

/// Lattice of local nodes every 4 units with jittered terrain cost and a few
/// impassable nodes.
fn build_local_graph(rng: &mut StdRng, side: usize) -> NavResult<LocalGraph> {
    let mut graph = LocalGraph::new();
    let spacing = 4.0;
    for y in 0..side {
        for x in 0..side {
            let cost = FixedNum::from_num(rng.random_range(0.0..0.5f32));
            graph.add_node(FixedVec3::from_f32(x as f32 * spacing, y as f32 * spacing, 0.0), cost);
        }
    }
    let step = FixedNum::from_num(spacing);
    for y in 0..side {
        for x in 0..side {
            let id = NodeId((y * side + x) as u32);
            if x + 1 < side {
                graph.add_edge(id, NodeId((y * side + x + 1) as u32), step, LocomotionMode::GROUND, true)?;
            }
            if y + 1 < side {
                graph.add_edge(id, NodeId(((y + 1) * side + x) as u32), step, LocomotionMode::GROUND, true)?;
            }
            if rng.random_ratio(1, 20) {
                graph.set_obstacle(id, true)?;
            }
        }
    }
    Ok(graph)
}

/// `side × side` square regions, each linked to its right and upper neighbour.
fn build_regions(side: u32) -> RegionLayout {
    let mut layout = RegionLayout::default();
    let id = |x: u32, y: u32| RegionId(y * side + x);
    for y in 0..side {
        for x in 0..side {
            let (x0, y0) = (x as f32 * REGION_SIZE, y as f32 * REGION_SIZE);
            let biome = BiomeTag(((x + y) % 3) as u16);
            let base_cost = FixedNum::from_num(1.0 + ((x * 7 + y * 3) % 4) as f32 * 0.25);
            layout.upsert_region(
                id(x, y),
                Aabb::new(
                    FixedVec3::from_f32(x0, y0, 0.0),
                    FixedVec3::from_f32(x0 + REGION_SIZE, y0 + REGION_SIZE, 0.0),
                ),
                biome,
                base_cost,
            );
        }
    }
    for y in 0..side {
        for x in 0..side {
            if x + 1 < side {
                layout.connect_by_distance(id(x, y), id(x + 1, y));
            }
            if y + 1 < side {
                layout.connect_by_distance(id(x, y), id(x, y + 1));
            }
        }
    }
    layout
}

fn build_transports() -> TransportNetwork {
    let mut network = TransportNetwork::default();
    network.insert(TransportEntity {
        id: FERRY,
        kind: TransitKind::Ferry,
        stops: smallvec![FixedVec3::from_f32(16.0, 16.0, 0.0), FixedVec3::from_f32(112.0, 112.0, 0.0)],
        speed: FixedNum::from_num(12.0),
        fuel_per_unit: FixedNum::from_num(0.2),
        risk_per_unit: FixedNum::from_num(0.05),
        base_cost: FixedNum::from_num(4.0),
        payment_required: true,
        bidirectional: true,
    });
    network.insert(TransportEntity {
        id: TransportRef(2),
        kind: TransitKind::Relay,
        stops: smallvec![
            FixedVec3::from_f32(16.0, 112.0, 0.0),
            FixedVec3::from_f32(48.0, 80.0, 0.0),
            FixedVec3::from_f32(80.0, 48.0, 0.0),
        ],
        speed: FixedNum::from_num(6.0),
        fuel_per_unit: FixedNum::from_num(0.1),
        risk_per_unit: FixedNum::ZERO,
        base_cost: FixedNum::ONE,
        payment_required: false,
        bidirectional: true,
    });
    network
}

fn populate(world: &mut NavWorld, rng: &mut StdRng, extent: f32) {
    world.push_command(NavCommand::AddLayer { layer: CROWD_LAYER, refresh_interval: None });
    world.push_command(NavCommand::AddFlowGoal {
        layer: CROWD_LAYER,
        position: FixedVec2::from_f32(extent - 8.0, extent * 0.5),
    });

    for i in 0..AGENT_COUNT {
        let position = FixedVec2::from_f32(rng.random_range(0.0..extent * 0.4), rng.random_range(0.0..extent));
        let mut agent = NavAgent::new(AgentId(i), position, CROWD_LAYER);
        agent.kind = AgentKind(rng.random_range(0..3));
        agent.speed_scalar = FixedNum::from_num(rng.random_range(0.8..1.2f32));
        world.push_command(NavCommand::SpawnAgent(agent));
    }

    for g in 0..GROUP_COUNT {
        let group = GroupId(g);
        world.push_command(NavCommand::CreateGroup(group));
        world.push_command(NavCommand::AssignRole {
            requester: Requester::Group(group),
            role: if g % 2 == 0 { RequesterRole::Courier } else { RequesterRole::Smuggler },
        });
        for m in 0..GROUP_SIZE {
            let mut agent = NavAgent::new(
                AgentId(10_000 + g * 100 + m),
                FixedVec2::from_f32(12.0 + m as f32, 12.0 + g as f32 * 4.0),
                CROWD_LAYER,
            );
            agent.group = Some(group);
            world.push_command(NavCommand::SpawnAgent(agent));
        }
    }

    let threats = (0..5)
        .map(|_| FixedVec2::from_f32(rng.random_range(extent * 0.4..extent * 0.8), rng.random_range(0.0..extent)))
        .collect();
    world.set_threats(threats);
}

fn request_group_routes(world: &mut NavWorld) -> NavResult<()> {
    for g in 0..GROUP_COUNT {
        let request = PathRequest::new(
            Requester::Group(GroupId(g)),
            FixedVec3::from_f32(14.0, 14.0, 0.0),
            FixedVec3::from_f32(114.0, 114.0, 0.0),
            LocomotionMode::GROUND,
            HeatTier::Cold,
        );
        world.submit_request(request)?;
    }
    Ok(())
}

/// Move every agent by its desired velocity for one step.
fn integrate(world: &mut NavWorld) -> NavResult<()> {
    let delta = world.clock().delta;
    let moves: Vec<(AgentId, FixedVec2)> = world
        .agents()
        .iter()
        .map(|a| (a.id, a.position + a.desired_velocity * delta))
        .collect();
    for (id, position) in moves {
        world.set_agent_position(id, position)?;
    }
    Ok(())
}

fn run(ticks: u64) -> NavResult<()> {
    let initial = InitialNavConfig::load_or_default(DEFAULT_CONFIG_PATH);
    let config = NavConfig::from(&initial);
    let extent = initial.flow_width as f32 * initial.flow_cell_size;

    let mut rng = StdRng::seed_from_u64(SEED);
    let local = build_local_graph(&mut rng, 32)?;
    let regions = build_regions(4);
    let mut transports = build_transports();

    let mut world = NavWorld::new(config, local);
    world.set_delta(FixedNum::from_num(0.05));
    populate(&mut world, &mut rng, extent);

    // First tick builds the hierarchy and applies the spawn commands
    world.tick(&regions, &transports);
    request_group_routes(&mut world)?;

    for _ in 1..ticks {
        let Some(stats) = world.tick(&regions, &transports) else {
            continue;
        };
        integrate(&mut world)?;

        if stats.tick == ticks / 2 && transports.remove(FERRY).is_some() {
            warn!("[DEMO] Ferry {:?} withdrawn at tick {}", FERRY, stats.tick);
            world.notify(WorldChange::TransportChanged(FERRY));
        }

        if stats.tick % 100 == 0 {
            info!(
                "[DEMO] tick {:>5} | graph v{} ({} regions, {} transit nodes) | planned {}L/{}S | deferred {} | refined {} | flow {} | steered {}+{} | replans {} | dropped {}",
                stats.tick,
                stats.graph_version,
                stats.graph.region_nodes,
                stats.graph.transit_nodes,
                stats.local_planned,
                stats.strategic_planned,
                stats.deferred,
                stats.segments_refined,
                stats.flow_rebuilds,
                stats.agents_steered,
                stats.group_members_steered,
                stats.replans,
                stats.dropped_requests,
            );
        }
    }

    let final_stats = world.stats();
    info!(
        "[DEMO] Finished {} ticks: {} agents, {} groups, {} dropped, {} deferred work units",
        ticks,
        world.agents().len(),
        world.groups().len(),
        final_stats.dropped_requests,
        final_stats.deferred_work
    );
    for group in world.groups() {
        info!(
            "[DEMO] Group {:?}: active {}, target {:?}",
            group.id,
            group.nav.active,
            group.nav.target_waypoint.map(|t| t.to_vec2())
        );
    }
    Ok(())
}

fn main() {
    match setup_file_logging() {
        Ok(log_file) => println!("wayfarer: logging to {}", log_file),
        Err(e) => eprintln!("wayfarer: file logging unavailable ({}), continuing without it", e),
    }

    let ticks = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_TICKS);

    if let Err(e) = run(ticks) {
        bevy::log::error!("[DEMO] Aborted: {}", e);
        std::process::exit(1);
    }
}
