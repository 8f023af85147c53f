//! Cross-cutting reactions shared by every hazard
//!
//! The [`Orchestrator`] owns the time-dilation, ambient-danger and
//! camera-shake controllers plus the effect outbox. Producers (the spawn
//! scheduler, contact routing, host code) get it by `&mut` and never talk to
//! presentation directly.

use glam::Vec3;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::clock::Clocks;
use super::state::{EffectCommand, ExplosionKind, HazardKind, SurfaceTag};
use crate::consts::BASE_FIXED_DT;
use crate::tuning::{ImpactProfile, ImpactTuning, PresentationTuning, SlowMotionTuning, Tuning};
use crate::{move_towards, random_in_unit_sphere};

/// Time-dilation phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DilationPhase {
    /// Normal speed
    Idle,
    /// Slowed until the real clock reaches `until`
    Holding { until: f64 },
    /// Ramping back to normal since `since` (real clock)
    Restoring { since: f64 },
}

/// Slow motion driven entirely by the real clock
#[derive(Debug, Clone)]
pub struct TimeDilation {
    tuning: SlowMotionTuning,
    phase: DilationPhase,
    scale: f32,
}

impl TimeDilation {
    pub fn new(tuning: SlowMotionTuning) -> Self {
        Self {
            tuning,
            phase: DilationPhase::Idle,
            scale: 1.0,
        }
    }

    /// Start (or restart) slow motion. Any running hold or ramp is cancelled.
    /// A missing or non-positive duration uses the configured default.
    pub fn trigger(&mut self, clocks: &Clocks, duration: Option<f32>) {
        let hold = duration
            .filter(|d| *d > 0.0)
            .unwrap_or(self.tuning.default_duration)
            .max(0.0);
        self.phase = DilationPhase::Holding {
            until: clocks.real() + hold as f64,
        };
        self.scale = self.tuning.scale;
    }

    /// Recompute the scale from the real clock
    pub fn update(&mut self, clocks: &Clocks) {
        let now = clocks.real();
        if let DilationPhase::Holding { until } = self.phase {
            if now < until {
                self.scale = self.tuning.scale;
                return;
            }
            self.phase = DilationPhase::Restoring { since: until };
        }
        if let DilationPhase::Restoring { since } = self.phase {
            let t = ((now - since) as f32 / self.tuning.ramp).clamp(0.0, 1.0);
            if t >= 1.0 {
                self.phase = DilationPhase::Idle;
                self.scale = 1.0;
            } else {
                self.scale = self.tuning.scale + (1.0 - self.tuning.scale) * t;
            }
        }
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Fixed physics step at the current scale
    #[inline]
    pub fn fixed_dt(&self) -> f32 {
        BASE_FIXED_DT * self.scale
    }

    pub fn phase(&self) -> DilationPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = DilationPhase::Idle;
        self.scale = 1.0;
    }
}

/// Reference-counted danger atmosphere (sky darkening)
#[derive(Debug, Clone)]
pub struct AmbientDanger {
    count: u32,
    darkness: f32,
    speed: f32,
}

impl AmbientDanger {
    pub fn new(speed: f32) -> Self {
        Self {
            count: 0,
            darkness: 0.0,
            speed,
        }
    }

    pub fn register(&mut self) {
        self.count += 1;
    }

    /// Saturates at zero
    pub fn unregister(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Presentation darkness in `[0, 1]`
    pub fn darkness(&self) -> f32 {
        self.darkness
    }

    pub fn update(&mut self, dt: f32) {
        let target = if self.is_active() { 1.0 } else { 0.0 };
        self.darkness = move_towards(self.darkness, target, dt * self.speed);
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.darkness = 0.0;
    }
}

/// Camera offset jitter. The latest request always wins.
#[derive(Debug, Clone)]
pub struct CameraShake {
    intensity: f32,
    duration: f32,
    remaining: f32,
    offset: Vec3,
    return_rate: f32,
    rng: Pcg32,
}

impl CameraShake {
    pub fn new(return_rate: f32, seed: u64) -> Self {
        Self {
            intensity: 0.0,
            duration: 0.0,
            remaining: 0.0,
            offset: Vec3::ZERO,
            return_rate,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn shake(&mut self, intensity: f32, duration: f32) {
        if duration <= 0.0 {
            return;
        }
        self.intensity = intensity;
        self.duration = duration;
        self.remaining = duration;
    }

    pub fn update(&mut self, dt: f32) {
        if self.remaining > 0.0 {
            let falloff = self.remaining / self.duration;
            self.offset = random_in_unit_sphere(&mut self.rng) * self.intensity * falloff;
            self.remaining -= dt;
        } else {
            let t = (dt * self.return_rate).clamp(0.0, 1.0);
            self.offset = self.offset.lerp(Vec3::ZERO, t);
        }
    }

    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn is_shaking(&self) -> bool {
        self.remaining > 0.0
    }

    /// Intensity of the request currently playing
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn remaining(&self) -> f32 {
        self.remaining.max(0.0)
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
        self.offset = Vec3::ZERO;
    }
}

/// What a hazard struck
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpactTarget {
    Player { position: Vec3, boosted: bool },
    Surface(SurfaceTag),
}

/// How an impact was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactOutcome {
    /// Boosted player smashed through
    HighEnergy,
    /// Player killed
    Lethal,
    /// Hazard hit a qualifying surface
    Environmental,
    /// Attract-mode camera is running; effects only
    Cinematic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub outcome: ImpactOutcome,
    /// Simulated seconds until the hazard is removed
    pub destroy_delay: f32,
}

/// Surfaces a hazard kind reacts to
fn surface_qualifies(kind: HazardKind, tag: SurfaceTag) -> bool {
    match kind {
        HazardKind::Meteor => matches!(
            tag,
            SurfaceTag::RedZone | SurfaceTag::House | SurfaceTag::Ground
        ),
        HazardKind::Vehicle => matches!(tag, SurfaceTag::RedZone | SurfaceTag::Car),
        HazardKind::Traffic => false,
    }
}

/// Single owner of the shared reaction services
#[derive(Debug, Clone)]
pub struct Orchestrator {
    impacts: ImpactTuning,
    time: TimeDilation,
    ambient: AmbientDanger,
    shake: CameraShake,
    outbox: Vec<EffectCommand>,
    cinematic: bool,
    death_sent: bool,
}

impl Orchestrator {
    pub fn new(tuning: &Tuning, seed: u64) -> Self {
        let PresentationTuning {
            shake_return_rate,
            darken_speed,
        } = tuning.presentation;
        Self {
            impacts: tuning.impacts,
            time: TimeDilation::new(tuning.slow_motion),
            ambient: AmbientDanger::new(darken_speed),
            shake: CameraShake::new(shake_return_rate, seed),
            outbox: Vec::new(),
            cinematic: false,
            death_sent: false,
        }
    }

    /// Per-frame controller update
    pub fn update(&mut self, clocks: &Clocks, sim_dt: f32) {
        self.time.update(clocks);
        self.ambient.update(sim_dt);
        self.shake.update(sim_dt);
    }

    pub fn trigger_slow_motion(&mut self, clocks: &Clocks, duration: Option<f32>) {
        self.time.trigger(clocks, duration);
    }

    pub fn shake_camera(&mut self, intensity: f32, duration: f32) {
        self.shake.shake(intensity, duration);
    }

    pub fn spawn_impact_effect(&mut self, kind: ExplosionKind, position: Vec3) {
        self.emit(EffectCommand::Explosion { kind, position });
    }

    pub fn emit(&mut self, command: EffectCommand) {
        self.outbox.push(command);
    }

    /// Take every pending command, oldest first
    pub fn drain_effects(&mut self) -> Vec<EffectCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_effects(&self) -> &[EffectCommand] {
        &self.outbox
    }

    pub fn set_cinematic(&mut self, cinematic: bool) {
        self.cinematic = cinematic;
    }

    pub fn is_cinematic(&self) -> bool {
        self.cinematic
    }

    pub fn time(&self) -> &TimeDilation {
        &self.time
    }

    pub fn ambient(&self) -> &AmbientDanger {
        &self.ambient
    }

    pub fn ambient_mut(&mut self) -> &mut AmbientDanger {
        &mut self.ambient
    }

    pub fn shake(&self) -> &CameraShake {
        &self.shake
    }

    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time.scale()
    }

    #[inline]
    pub fn fixed_dt(&self) -> f32 {
        self.time.fixed_dt()
    }

    pub fn player_dead(&self) -> bool {
        self.death_sent
    }

    fn profile(&self, kind: HazardKind) -> ImpactProfile {
        match kind {
            HazardKind::Traffic => self.impacts.traffic,
            HazardKind::Vehicle => self.impacts.vehicle,
            HazardKind::Meteor => self.impacts.meteor,
        }
    }

    /// Resolve a hazard impact and dispatch its reactions.
    ///
    /// Returns `None` when the target does not qualify for this kind; nothing
    /// is dispatched in that case.
    pub fn resolve_impact(
        &mut self,
        clocks: &Clocks,
        kind: HazardKind,
        hazard_position: Vec3,
        point: Vec3,
        target: ImpactTarget,
    ) -> Option<Resolution> {
        if let ImpactTarget::Surface(tag) = target {
            if !surface_qualifies(kind, tag) {
                log::trace!("{:?} hit non-qualifying surface {:?}", kind, tag);
                return None;
            }
        }

        let profile = self.profile(kind);
        let standard = ExplosionKind::standard_for(kind);

        if self.cinematic {
            self.spawn_impact_effect(standard, point);
            return Some(Resolution {
                outcome: ImpactOutcome::Cinematic,
                destroy_delay: self.impacts.cinematic_destroy_delay,
            });
        }

        let resolution = match target {
            ImpactTarget::Player {
                position,
                boosted: true,
            } => {
                self.spawn_impact_effect(ExplosionKind::Plasma, point);
                self.time
                    .trigger(clocks, Some(profile.high_energy_slow_motion));
                let force = profile.push_force * 2.0;
                if force > 0.0 {
                    self.emit(EffectCommand::HazardKnockback {
                        position: hazard_position,
                        force,
                    });
                }
                log::debug!("{:?} smashed by boosted player at {:?}", kind, position);
                Resolution {
                    outcome: ImpactOutcome::HighEnergy,
                    destroy_delay: profile.high_energy_destroy_delay,
                }
            }
            ImpactTarget::Player {
                position,
                boosted: false,
            } => {
                self.spawn_impact_effect(standard, point);
                self.time.trigger(clocks, Some(profile.lethal_slow_motion));
                let away = (position - hazard_position).normalize_or_zero();
                let impulse = away * profile.push_force + Vec3::Y * profile.lift_force;
                if impulse != Vec3::ZERO {
                    self.emit(EffectCommand::PlayerKnockback { impulse });
                }
                if !self.death_sent {
                    self.death_sent = true;
                    self.emit(EffectCommand::PlayerDeath);
                    log::info!("Player killed by {:?} at {:?}", kind, point);
                }
                Resolution {
                    outcome: ImpactOutcome::Lethal,
                    destroy_delay: profile.lethal_destroy_delay,
                }
            }
            ImpactTarget::Surface(tag) => {
                self.spawn_impact_effect(standard, point);
                if let Some(hold) = profile.environment_slow_motion {
                    self.time.trigger(clocks, Some(hold));
                }
                log::debug!("{:?} struck {:?} at {:?}", kind, tag, point);
                Resolution {
                    outcome: ImpactOutcome::Environmental,
                    destroy_delay: profile.environment_destroy_delay,
                }
            }
        };

        if let Some(shake) = profile.shake {
            self.shake.shake(shake.intensity, shake.duration);
        }

        Some(resolution)
    }

    /// Forget every transient reaction (new run)
    pub fn reset(&mut self) {
        self.time.reset();
        self.ambient.reset();
        self.shake.reset();
        self.outbox.clear();
        self.death_sent = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clocks_at(real: f32) -> Clocks {
        let mut clocks = Clocks::new();
        clocks.advance(real, real);
        clocks
    }

    #[test]
    fn test_slow_motion_hold_and_ramp() {
        let mut time = TimeDilation::new(SlowMotionTuning::default());
        time.trigger(&clocks_at(0.0), None);
        assert_eq!(time.scale(), 0.2);
        assert!((time.fixed_dt() - 0.004).abs() < 1e-6);

        time.update(&clocks_at(0.7));
        assert_eq!(time.scale(), 0.2);

        // Halfway through the 0.5 s ramp after the 0.8 s hold
        time.update(&clocks_at(1.05));
        assert!((time.scale() - 0.6).abs() < 1e-4);

        time.update(&clocks_at(1.4));
        assert_eq!(time.scale(), 1.0);
        assert_eq!(time.phase(), DilationPhase::Idle);
    }

    #[test]
    fn test_second_trigger_cancels_first() {
        let mut time = TimeDilation::new(SlowMotionTuning::default());
        time.trigger(&clocks_at(0.0), Some(0.8));
        time.update(&clocks_at(0.5));
        time.trigger(&clocks_at(0.5), Some(0.8));

        // The first request would be ramping by now
        time.update(&clocks_at(1.0));
        assert_eq!(time.scale(), 0.2);

        time.update(&clocks_at(1.55));
        assert!((time.scale() - 0.6).abs() < 1e-4);

        time.update(&clocks_at(2.0));
        assert_eq!(time.scale(), 1.0);
    }

    #[test]
    fn test_ambient_refcount() {
        let mut ambient = AmbientDanger::new(1.5);
        ambient.register();
        ambient.register();
        ambient.unregister();
        assert!(ambient.is_active());
        ambient.unregister();
        assert!(!ambient.is_active());
        ambient.unregister();
        assert_eq!(ambient.count(), 0);
    }

    #[test]
    fn test_darkness_eases_toward_target() {
        let mut ambient = AmbientDanger::new(1.5);
        ambient.register();
        ambient.update(0.5);
        assert!((ambient.darkness() - 0.75).abs() < 1e-6);
        ambient.update(0.5);
        assert_eq!(ambient.darkness(), 1.0);
        ambient.unregister();
        ambient.update(0.2);
        assert!((ambient.darkness() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_shake_latest_wins_and_settles() {
        let mut shake = CameraShake::new(5.0, 3);
        shake.shake(1.2, 0.5);
        shake.shake(0.3, 1.0);
        assert_eq!(shake.intensity(), 0.3);
        assert_eq!(shake.remaining(), 1.0);

        shake.update(0.1);
        assert!(shake.offset().length() <= 0.3);
        for _ in 0..20 {
            shake.update(0.1);
        }
        assert!(!shake.is_shaking());
        for _ in 0..60 {
            shake.update(0.1);
        }
        assert!(shake.offset().length() < 1e-3);
    }

    #[test]
    fn test_lethal_traffic_impact() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        let clocks = Clocks::new();
        let player = Vec3::new(0.0, 1.0, 10.0);
        let res = orch
            .resolve_impact(
                &clocks,
                HazardKind::Traffic,
                Vec3::new(0.0, 1.0, 12.0),
                Vec3::new(0.0, 1.0, 11.0),
                ImpactTarget::Player {
                    position: player,
                    boosted: false,
                },
            )
            .unwrap();
        assert_eq!(res.outcome, ImpactOutcome::Lethal);
        assert_eq!(res.destroy_delay, 1.0);
        assert_eq!(orch.time_scale(), 0.2);

        let effects = orch.drain_effects();
        assert_eq!(
            effects[0],
            EffectCommand::Explosion {
                kind: ExplosionKind::Car,
                position: Vec3::new(0.0, 1.0, 11.0)
            }
        );
        assert!(effects.contains(&EffectCommand::PlayerKnockback {
            impulse: Vec3::new(0.0, 20.0, -50.0)
        }));
        assert_eq!(
            effects
                .iter()
                .filter(|e| **e == EffectCommand::PlayerDeath)
                .count(),
            1
        );
        assert!(orch.drain_effects().is_empty());
    }

    #[test]
    fn test_death_is_dispatched_once() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        let clocks = Clocks::new();
        let target = ImpactTarget::Player {
            position: Vec3::ZERO,
            boosted: false,
        };
        for _ in 0..2 {
            orch.resolve_impact(&clocks, HazardKind::Vehicle, Vec3::Z, Vec3::Z, target);
        }
        let deaths = orch
            .drain_effects()
            .into_iter()
            .filter(|e| *e == EffectCommand::PlayerDeath)
            .count();
        assert_eq!(deaths, 1);
        assert!(orch.player_dead());
    }

    #[test]
    fn test_boosted_player_survives() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        let clocks = Clocks::new();
        let res = orch
            .resolve_impact(
                &clocks,
                HazardKind::Traffic,
                Vec3::new(0.0, 0.5, 3.0),
                Vec3::new(0.0, 0.5, 2.0),
                ImpactTarget::Player {
                    position: Vec3::ZERO,
                    boosted: true,
                },
            )
            .unwrap();
        assert_eq!(res.outcome, ImpactOutcome::HighEnergy);
        assert_eq!(res.destroy_delay, 0.0);

        let effects = orch.drain_effects();
        assert!(!effects.contains(&EffectCommand::PlayerDeath));
        assert!(effects.contains(&EffectCommand::Explosion {
            kind: ExplosionKind::Plasma,
            position: Vec3::new(0.0, 0.5, 2.0)
        }));
        assert!(effects.contains(&EffectCommand::HazardKnockback {
            position: Vec3::new(0.0, 0.5, 3.0),
            force: 100.0
        }));
    }

    #[test]
    fn test_meteor_surface_impact() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        let clocks = Clocks::new();
        let res = orch
            .resolve_impact(
                &clocks,
                HazardKind::Meteor,
                Vec3::ZERO,
                Vec3::ZERO,
                ImpactTarget::Surface(SurfaceTag::House),
            )
            .unwrap();
        assert_eq!(res.outcome, ImpactOutcome::Environmental);
        assert_eq!(orch.time_scale(), 1.0);
        assert!(orch.shake().is_shaking());
        assert_eq!(orch.shake().intensity(), 1.2);
    }

    #[test]
    fn test_non_qualifying_surface_is_ignored() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        let res = orch.resolve_impact(
            &Clocks::new(),
            HazardKind::Vehicle,
            Vec3::ZERO,
            Vec3::ZERO,
            ImpactTarget::Surface(SurfaceTag::House),
        );
        assert!(res.is_none());
        let res = orch.resolve_impact(
            &Clocks::new(),
            HazardKind::Meteor,
            Vec3::ZERO,
            Vec3::ZERO,
            ImpactTarget::Surface(SurfaceTag::Car),
        );
        assert!(res.is_none());
        assert!(orch.pending_effects().is_empty());
    }

    #[test]
    fn test_vehicle_reacts_to_red_zone_and_cars() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        for tag in [SurfaceTag::RedZone, SurfaceTag::Car] {
            let res = orch
                .resolve_impact(
                    &Clocks::new(),
                    HazardKind::Vehicle,
                    Vec3::Z,
                    Vec3::Z,
                    ImpactTarget::Surface(tag),
                )
                .unwrap();
            assert_eq!(res.outcome, ImpactOutcome::Environmental);
            assert_eq!(res.destroy_delay, 0.05);
            assert_eq!(
                orch.drain_effects(),
                vec![EffectCommand::Explosion {
                    kind: ExplosionKind::Car,
                    position: Vec3::Z
                }]
            );
            assert_eq!(orch.time_scale(), 1.0);
            assert!(!orch.player_dead());
        }
    }

    #[test]
    fn test_non_positive_duration_uses_default() {
        let mut time = TimeDilation::new(SlowMotionTuning::default());
        for duration in [Some(0.0), Some(-1.0)] {
            time.trigger(&clocks_at(0.0), duration);
            assert_eq!(
                time.phase(),
                DilationPhase::Holding {
                    until: 0.8f32 as f64
                }
            );
        }
    }

    #[test]
    fn test_cinematic_mode_is_effects_only() {
        let mut orch = Orchestrator::new(&Tuning::default(), 1);
        orch.set_cinematic(true);
        let res = orch
            .resolve_impact(
                &Clocks::new(),
                HazardKind::Traffic,
                Vec3::Z,
                Vec3::Z,
                ImpactTarget::Player {
                    position: Vec3::ZERO,
                    boosted: false,
                },
            )
            .unwrap();
        assert_eq!(res.outcome, ImpactOutcome::Cinematic);
        assert_eq!(res.destroy_delay, 1.0);
        assert_eq!(orch.drain_effects().len(), 1);
        assert_eq!(orch.time_scale(), 1.0);
    }
}
