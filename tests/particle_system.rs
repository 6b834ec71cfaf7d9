use glam::{Vec2, Vec4};
use kestrel_fx::particles::{
    AnimationFrame, EffectParameters, Emitter, EmitterMode, Keyframe, KeyframeTrack, ParticleSystem,
    RecordingRenderer, RotateToVelocity, SpeedScale, SystemDefinition, Varied,
};
use std::path::Path;
use std::sync::Arc;

fn definition(mode: EmitterMode, rate: f32, capacity: usize, lifetime: f32) -> SystemDefinition {
    let mut def = SystemDefinition::new(
        Emitter::point(Vec2::ZERO, mode, rate),
        KeyframeTrack::constant(Vec2::ONE, Vec4::ONE),
        vec![AnimationFrame::new("spark.png", 8, 8, 50)],
    );
    def.max_particles = capacity;
    def.particle_lifetime = Varied::<f32>::fixed(lifetime);
    def
}

fn system(def: SystemDefinition, seed: u64) -> ParticleSystem {
    ParticleSystem::with_seed(Arc::new(def), seed).expect("valid definition")
}

fn run(system: &mut ParticleSystem, dt: f32, steps: usize) {
    let params = EffectParameters::default();
    for _ in 0..steps {
        assert!(system.update(dt, &params));
    }
}

#[test]
fn live_count_never_exceeds_capacity() {
    let mut def = definition(EmitterMode::Always, 0.0, 16, 0.3);
    def.particle_lifetime = Varied::new(0.3, 0.2);
    let mut system = system(def, 1);
    let params = EffectParameters::default();
    let steps = [0.016, 0.1, 0.0, 0.25, 0.033, 0.5, 0.004];
    for round in 0..40 {
        let dt = steps[round % steps.len()];
        system.update(dt, &params);
        assert!(system.num_particles() <= system.capacity());
        assert_eq!(system.particles().len(), system.num_particles());
    }
    assert_eq!(system.num_particles(), 16);
}

#[test]
fn live_particles_never_outlive_their_lifetime() {
    let mut def = definition(EmitterMode::Looping, 60.0, 200, 0.5);
    def.particle_lifetime = Varied::new(0.5, 0.3);
    let mut system = system(def, 2);
    let params = EffectParameters::default();
    for _ in 0..300 {
        system.update(1.0 / 60.0, &params);
        for particle in system.particles() {
            assert!(particle.time <= particle.lifetime, "{} > {}", particle.time, particle.lifetime);
        }
    }
}

#[test]
fn rate_emission_is_frame_rate_independent() {
    for dt in [1.0_f32 / 30.0, 1.0 / 240.0] {
        let mut system = system(definition(EmitterMode::Looping, 25.0, 1000, 100.0), 3);
        let steps = (8.0 / dt).round() as usize;
        run(&mut system, dt, steps);
        let emitted = system.total_emitted() as i64;
        assert!((emitted - 200).abs() <= 1, "dt {dt}: emitted {emitted}");
        assert_eq!(system.num_particles() as i64, emitted);
    }
}

#[test]
fn always_mode_fills_the_pool_immediately() {
    let mut system = system(definition(EmitterMode::Always, 10.0, 5, 10.0), 4);
    run(&mut system, 1.0, 1);
    assert_eq!(system.num_particles(), 5);
}

#[test]
fn burst_emits_once_and_then_dies() {
    let mut system = system(definition(EmitterMode::Burst, 0.0, 12, 0.5), 5);
    run(&mut system, 0.1, 1);
    assert_eq!(system.num_particles(), 12);
    assert_eq!(system.total_emitted(), 12);
    assert!(system.is_stopped());

    run(&mut system, 0.1, 3);
    assert_eq!(system.total_emitted(), 12);
    assert_eq!(system.num_particles(), 12);

    run(&mut system, 0.1, 10);
    assert_eq!(system.num_particles(), 0);
    assert!(!system.is_alive());
}

#[test]
fn one_shot_stops_after_system_lifetime() {
    let mut def = definition(EmitterMode::OneShot, 10.0, 100, 0.2);
    def.system_lifetime = 1.0;
    let mut system = system(def, 6);
    run(&mut system, 0.05, 10);
    assert!(!system.is_stopped());
    assert!(system.num_particles() > 0);

    run(&mut system, 0.05, 50);
    assert!(system.is_stopped());
    assert!(!system.is_alive());
    assert!((9..=11).contains(&system.total_emitted()), "emitted {}", system.total_emitted());

    let before = system.total_emitted();
    run(&mut system, 0.05, 10);
    assert_eq!(system.total_emitted(), before);
}

#[test]
fn start_time_delays_first_emission() {
    let mut def = definition(EmitterMode::Always, 0.0, 8, 10.0);
    def.emitter.start_time = 0.5;
    let mut system = system(def, 7);
    run(&mut system, 0.25, 1);
    assert_eq!(system.num_particles(), 0);
    assert!(system.is_alive());
    run(&mut system, 0.5, 1);
    assert_eq!(system.num_particles(), 8);
}

#[test]
fn soft_stop_lets_particles_finish() {
    let mut system = system(definition(EmitterMode::Looping, 20.0, 100, 0.5), 8);
    run(&mut system, 0.1, 5);
    let emitted = system.total_emitted();
    assert!(emitted > 0);

    system.stop();
    assert!(system.is_alive(), "live particles keep the system alive");
    run(&mut system, 0.1, 2);
    assert_eq!(system.total_emitted(), emitted);
    run(&mut system, 0.1, 10);
    assert!(!system.is_alive());

    system.start();
    assert!(system.is_alive());
    run(&mut system, 0.1, 3);
    assert!(system.total_emitted() > emitted);
}

#[test]
fn clear_drops_particles_immediately() {
    let mut system = system(definition(EmitterMode::Always, 0.0, 4, 10.0), 9);
    run(&mut system, 0.1, 1);
    system.clear();
    assert_eq!(system.num_particles(), 0);
    assert!(!system.is_alive());
}

#[test]
fn unusable_steps_are_rejected() {
    let mut system = system(definition(EmitterMode::Always, 0.0, 4, 10.0), 10);
    let params = EffectParameters::default();
    assert!(!system.update(f32::NAN, &params));
    assert!(!system.update(-0.1, &params));
    assert_eq!(system.age(), 0.0);
    assert!(system.update(0.0, &params));
}

#[test]
fn particles_pin_to_last_keyframe() {
    let track = KeyframeTrack::new(vec![
        Keyframe::new(0.0, Vec2::ONE, Vec4::ONE),
        Keyframe::new(0.5, Vec2::splat(3.0), Vec4::new(1.0, 0.0, 0.0, 0.5)),
    ])
    .expect("track");
    let mut def = definition(EmitterMode::Burst, 0.0, 1, 2.0);
    def.keyframes = track;
    let mut system = system(def, 11);
    run(&mut system, 0.1, 15);
    let particle = system.particles()[0];
    assert!(particle.size.abs_diff_eq(Vec2::splat(3.0), 1e-5), "{:?}", particle.size);
    assert!(particle.color.abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 0.5), 1e-5));
}

#[test]
fn orientation_rotates_spawn_offsets() {
    let mut def = definition(EmitterMode::Burst, 0.0, 1, 10.0);
    def.emitter = Emitter::point(Vec2::new(10.0, 0.0), EmitterMode::Burst, 0.0);
    let mut system = system(def, 12);
    let params = EffectParameters { orientation: std::f32::consts::FRAC_PI_2, attractor: Vec2::ZERO };
    system.update(0.1, &params);
    let position = system.particles()[0].position;
    assert!(position.abs_diff_eq(Vec2::new(0.0, 10.0), 1e-4), "{position:?}");
}

#[test]
fn draw_translates_quads_by_origin() {
    let mut system = system(definition(EmitterMode::Burst, 0.0, 3, 10.0), 13);
    run(&mut system, 0.1, 1);
    let mut renderer = RecordingRenderer::new();
    system.draw(Vec2::new(100.0, 50.0), &mut renderer).expect("draw");
    assert_eq!(renderer.batches.len(), 1);
    assert_eq!(renderer.total_quads(), 3);

    // Unit keyframe size over an 8x8 frame puts every corner 4 units from the origin.
    let batch = &renderer.batches[0];
    assert_eq!(batch.vertices.len(), 12);
    for vertex in &batch.vertices {
        assert!((vertex.position[0] - 100.0).abs() <= 4.0 + 1e-4);
        assert!((vertex.position[1] - 50.0).abs() <= 4.0 + 1e-4);
    }
    assert_eq!(batch.vertices[0].position, [96.0, 54.0, 0.0]);
    assert_eq!(batch.vertices[0].tex_coord, [0.0, 0.0]);
    assert_eq!(batch.vertices[2].tex_coord, [1.0, 1.0]);
}

#[test]
fn smooth_animation_cross_fades_into_next_frame() {
    let mut def = definition(EmitterMode::Burst, 0.0, 2, 10.0);
    def.animation = vec![AnimationFrame::new("a.png", 8, 8, 100), AnimationFrame::new("b.png", 8, 8, 100)];
    def.smooth_animation = true;
    let mut system = system(def, 14);
    run(&mut system, 0.025, 1);

    let mut renderer = RecordingRenderer::new();
    system.draw(Vec2::ZERO, &mut renderer).expect("draw");
    assert_eq!(renderer.batches.len(), 2);
    let (current, next) = (&renderer.batches[0], &renderer.batches[1]);
    assert_eq!(current.frame_path, Path::new("a.png"));
    assert_eq!(next.frame_path, Path::new("b.png"));
    assert_eq!(current.vertices.len(), next.vertices.len());
    assert!(current.vertices.iter().all(|vertex| (vertex.color[3] - 0.75).abs() < 1e-4));
    assert!(next.vertices.iter().all(|vertex| (vertex.color[3] - 0.25).abs() < 1e-4));
}

#[test]
fn single_frame_animation_draws_one_batch_even_when_smooth() {
    let mut def = definition(EmitterMode::Burst, 0.0, 2, 10.0);
    def.smooth_animation = true;
    let mut system = system(def, 15);
    run(&mut system, 0.025, 1);
    let mut renderer = RecordingRenderer::new();
    system.draw(Vec2::ZERO, &mut renderer).expect("draw");
    assert_eq!(renderer.batches.len(), 1);
    assert!(renderer.batches[0].vertices.iter().all(|vertex| vertex.color[3] == 1.0));
}

#[test]
fn rotate_to_velocity_aligns_and_stretches_quads() {
    let mut def = definition(EmitterMode::Burst, 0.0, 1, 10.0);
    def.animation = vec![AnimationFrame::new("streak.png", 2, 2, 50)];
    def.emitter = Emitter {
        omnidirectional: false,
        orientation: 0.0,
        initial_speed: 10.0,
        mode: EmitterMode::Burst,
        ..Default::default()
    };
    def.rotate_to_velocity =
        Some(RotateToVelocity { speed_scale: Some(SpeedScale { scale: 0.5, min: 0.0, max: 100.0 }) });
    let mut system = system(def, 16);
    run(&mut system, 0.1, 1);

    let mut renderer = RecordingRenderer::new();
    system.draw(Vec2::ZERO, &mut renderer).expect("draw");
    let vertices = &renderer.batches[0].vertices;
    // Moving along +x turns the quad a quarter turn clockwise, and speed 10 at
    // scale 0.5 stretches its half height from 1 to 5 along the direction of travel.
    let expected = [[5.0, 1.0], [5.0, -1.0], [-5.0, -1.0], [-5.0, 1.0]];
    for (vertex, corner) in vertices.iter().zip(expected) {
        let position = Vec2::new(vertex.position[0], vertex.position[1]);
        assert!(position.abs_diff_eq(Vec2::from_array(corner), 1e-4), "{position:?} vs {corner:?}");
    }
}

#[test]
fn speed_scale_is_clamped_to_its_maximum() {
    let mut def = definition(EmitterMode::Burst, 0.0, 1, 10.0);
    def.animation = vec![AnimationFrame::new("streak.png", 2, 2, 50)];
    def.emitter =
        Emitter { omnidirectional: false, initial_speed: 100.0, mode: EmitterMode::Burst, ..Default::default() };
    def.rotate_to_velocity =
        Some(RotateToVelocity { speed_scale: Some(SpeedScale { scale: 1.0, min: 0.0, max: 2.0 }) });
    let mut system = system(def, 17);
    run(&mut system, 0.1, 1);

    let mut renderer = RecordingRenderer::new();
    system.draw(Vec2::ZERO, &mut renderer).expect("draw");
    let upper_left = renderer.batches[0].vertices[0].position;
    assert!((upper_left[0] - 2.0).abs() < 1e-4 && (upper_left[1] - 1.0).abs() < 1e-4, "{upper_left:?}");
}
