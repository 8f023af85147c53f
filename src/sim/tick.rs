//! Frame + fixed timestep driver
//!
//! One call per rendered frame. Frame logic runs once; physics runs in fixed
//! substeps whose length follows the current time scale.

use super::contact::Contact;
use super::state::PlayerState;
use super::world::World;
use crate::consts::*;

/// Input for a single frame (deterministic)
#[derive(Debug, Clone)]
pub struct TickInput {
    /// Latest snapshot from the locomotion controller
    pub player: PlayerState,
    /// Contacts reported by the host's physics
    pub contacts: Vec<Contact>,
    /// Run the built-in overlap detector every fixed tick
    pub detect_contacts: bool,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            player: PlayerState::default(),
            contacts: Vec::new(),
            detect_contacts: true,
        }
    }
}

impl TickInput {
    pub fn new(player: PlayerState) -> Self {
        Self {
            player,
            ..Default::default()
        }
    }
}

/// Advance the world by one frame of `real_dt` wall-clock seconds.
///
/// Returns the number of fixed substeps that ran.
pub fn step(world: &mut World, input: &TickInput, real_dt: f32) -> u32 {
    let real_dt = real_dt.clamp(0.0, MAX_FRAME_DT);
    let sim_dt = real_dt * world.time_scale();
    world.clocks.advance(real_dt, sim_dt);
    world.player = input.player;

    // Prune/recycle, then spawn
    world.frame_update(sim_dt);

    for contact in &input.contacts {
        world.handle_contact(*contact);
    }

    world.accumulator += sim_dt;
    let mut substeps = 0;
    loop {
        let fixed_dt = world.fixed_dt();
        if fixed_dt <= 0.0 || world.accumulator < fixed_dt || substeps >= MAX_SUBSTEPS {
            break;
        }
        world.fixed_update(fixed_dt, input.detect_contacts);
        world.accumulator -= fixed_dt;
        substeps += 1;
    }

    // Drop the backlog rather than spiral
    if substeps >= MAX_SUBSTEPS {
        world.accumulator = world.accumulator.min(world.fixed_dt());
    }
    substeps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::EffectCommand;
    use crate::tuning::Tuning;
    use glam::Vec3;

    /// No hazard vehicles, so nothing can trigger slow motion on its own
    fn calm() -> Tuning {
        let mut tuning = Tuning::default();
        tuning.hazards.profiles.clear();
        tuning
    }

    fn run(world: &mut World, seconds: f32, speed: f32) -> Vec<EffectCommand> {
        let dt = 1.0 / 60.0;
        let frames = (seconds / dt) as u32;
        let mut effects = Vec::new();
        let mut player = PlayerState::at(Vec3::new(-2.0, 0.5, 0.0));
        for _ in 0..frames {
            player.position.z += speed * dt;
            step(world, &TickInput::new(player), dt);
            effects.extend(world.drain_effects());
        }
        effects
    }

    #[test]
    fn test_fixed_ticks_per_real_second() {
        let mut world = World::new(calm(), 1);
        let before = world.tick_count();
        run(&mut world, 1.0, 0.0);
        let ticks = world.tick_count() - before;
        assert!((49..=50).contains(&ticks), "ticks {}", ticks);
    }

    #[test]
    fn test_slow_motion_scales_fixed_step() {
        let mut world = World::new(calm(), 1);
        world.trigger_slow_motion(Some(5.0));
        assert!((world.fixed_dt() - 0.004).abs() < 1e-6);

        let sim_before = world.clocks().sim();
        let ticks_before = world.tick_count();
        run(&mut world, 1.0, 0.0);
        let sim_elapsed = world.clocks().sim() - sim_before;
        assert!((sim_elapsed - 0.2).abs() < 0.01);
        // Same physics rate in real time
        let ticks = world.tick_count() - ticks_before;
        assert!((49..=50).contains(&ticks), "ticks {}", ticks);
    }

    #[test]
    fn test_long_frames_are_clamped() {
        let mut world = World::new(Tuning::default(), 1);
        let substeps = step(&mut world, &TickInput::default(), 5.0);
        assert!(substeps <= MAX_SUBSTEPS);
        assert!((world.clocks().real() - MAX_FRAME_DT as f64).abs() < 1e-6);
    }

    #[test]
    fn test_run_streams_and_recycles() {
        let mut world = World::new(Tuning::full(), 42);
        run(&mut world, 20.0, 30.0);

        // Passed segments were torn down, the rest are ordered
        let starts: Vec<f32> = world.active_segments().map(|s| s.start).collect();
        assert!(starts[0] > 0.0);
        assert!(starts.windows(2).all(|w| w[1] > w[0]));

        // Nothing on the roster is far behind the player
        let player_z = world.player().progress();
        for car in world.traffic().pool().iter_active() {
            assert!(car.transform.position.z >= player_z - 25.0 - 1.0);
        }
        let stats = world.pool_stats();
        assert_eq!(stats.total, stats.free + stats.active);
        let in_flight = world
            .traffic()
            .hazards()
            .iter()
            .filter(|h| h.darkens_sky)
            .count();
        assert_eq!(world.orchestrator().ambient().count() as usize, in_flight);
    }

    #[test]
    fn test_deterministic_replay() {
        let mut a = World::new(Tuning::full(), 7);
        let mut b = World::new(Tuning::full(), 7);
        let effects_a = run(&mut a, 10.0, 25.0);
        let effects_b = run(&mut b, 10.0, 25.0);

        assert_eq!(effects_a, effects_b);
        assert_eq!(a.traffic().state(), b.traffic().state());
        assert_eq!(a.tick_count(), b.tick_count());
        let positions = |w: &World| {
            w.traffic()
                .hazards()
                .iter()
                .map(|h| h.position())
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(&a), positions(&b));
        assert_eq!(a.camera_offset(), b.camera_offset());
    }
}
