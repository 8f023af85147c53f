//! Road Rush headless runner
//!
//! Drives the world core with a scripted runner and logs what happens.
//!
//! Usage: `road-rush [tuning.json] [seed] [seconds]`

use glam::Vec3;

use road_rush::sim::{EffectCommand, PlayerState, TickInput, World, step};
use road_rush::{Tuning, TuningError};

/// Simulated display refresh
const FRAME_DT: f32 = 1.0 / 60.0;
/// Scripted runner speed along +Z
const RUN_SPEED: f32 = 30.0;
/// Sprint speed multiplier
const SPRINT_FACTOR: f32 = 1.6;

fn load_tuning(path: Option<&str>) -> Result<Tuning, TuningError> {
    match path {
        Some(path) => Tuning::load(path),
        None => Ok(Tuning::full()),
    }
}

fn main() {
    env_logger::init();
    log::info!("Road Rush (headless) starting...");

    let args: Vec<String> = std::env::args().collect();
    let tuning = match load_tuning(args.get(1).map(String::as_str)) {
        Ok(tuning) => tuning,
        Err(e) => {
            log::error!("Failed to load tuning: {}", e);
            std::process::exit(1);
        }
    };
    let seed = args
        .get(2)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0x5eed);
    let seconds = args
        .get(3)
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(60.0);

    let mut world = World::new(tuning, seed);
    let mut player = PlayerState::at(Vec3::new(-2.0, 0.5, 0.0));
    let mut sprint_left = 0.0f32;
    let mut elapsed = 0.0f32;
    let mut explosions = 0u32;

    while elapsed < seconds && player.alive {
        let scaled = FRAME_DT * world.time_scale();
        let speed = if sprint_left > 0.0 {
            RUN_SPEED * SPRINT_FACTOR
        } else {
            RUN_SPEED
        };
        player.velocity = Vec3::Z * speed;
        player.position += player.velocity * scaled;
        sprint_left = (sprint_left - scaled).max(0.0);
        player.boosted = sprint_left > 0.0;

        step(&mut world, &TickInput::new(player), FRAME_DT);
        elapsed += FRAME_DT;

        for effect in world.drain_effects() {
            match effect {
                EffectCommand::Explosion { kind, position } => {
                    explosions += 1;
                    log::debug!("Explosion {:?} at {:?}", kind, position);
                }
                EffectCommand::PlayerDeath => {
                    log::info!("Player died at z {:.1} after {:.1}s", player.position.z, elapsed);
                    player.alive = false;
                }
                EffectCommand::PlayerKnockback { impulse } => {
                    player.velocity += impulse;
                }
                EffectCommand::SprintBoost { duration } => {
                    sprint_left = sprint_left.max(duration);
                    log::info!("Sprint for {:.1}s", duration);
                }
                EffectCommand::HazardKnockback { .. } => {}
            }
        }
    }

    let stats = world.pool_stats();
    log::info!(
        "Ran {:.1}s ({} ticks), distance {:.0}, {} explosions",
        elapsed,
        world.tick_count(),
        player.position.z,
        explosions
    );
    log::info!(
        "Segments {}, hazards {}, pool {} total / {} active / {} grown",
        world.active_segments().count(),
        world.traffic().hazards().len(),
        stats.total,
        stats.active,
        stats.grown
    );
}
