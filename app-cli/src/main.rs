//! A short scripted demo: one layer, a handful of entities tracked for
//! collision, an optional sound effect, and a few ticks of the engine loop.
//! Trimmed from the teacher's interactive `crossterm` arrow-key demo down to
//! a non-interactive run that exercises scene, collision, and audio
//! together — the host-side wiring `engine-core` deliberately stays
//! ignorant of (`LayerStack::active_audio` hands the opaque audio state to
//! whoever owns the mixer).

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_backend::create_audio_backend;
use audio_system::AudioEngine;
use collision::{Point, Rect};
use engine_core::{EntityKey, Layer, LayerStack, Pose};
use parking_lot::Mutex;
use tracing::info;

const TICKS: u32 = 120;
const TARGET_FRAME: Duration = Duration::from_micros(16_667);

fn world_bounds() -> Rect {
    Rect::new(Point::new(-500.0, -500.0), Point::new(500.0, 500.0))
}

fn main() {
    tracing_subscriber::fmt::init();

    let audio_engine = AudioEngine::new(create_audio_backend().expect("no audio output device available"));

    let mut stack: LayerStack<Arc<Mutex<audio_system::AudioState>>> = LayerStack::new();
    let layer = Layer::new(world_bounds(), Arc::new(Mutex::new(audio_system::AudioState::new()))).expect("layer bounds");
    stack.push(layer);
    audio_engine.set_active(Some(stack.active_audio().expect("active layer").clone()));

    if let Some(path) = std::env::args().nth(1) {
        match audio_engine.clip_manager().load(path.clone().into()) {
            Ok(clip_id) => {
                let layer = stack.active_mut().expect("active layer");
                let mut audio = layer.audio.lock();
                match audio.queue_clip(audio_engine.clip_manager(), audio_engine.worker(), clip_id, 255, 0) {
                    Ok(id) => info!(id, %path, "queued sound effect"),
                    Err(e) => info!(%e, %path, "failed to queue sound effect"),
                }
            }
            Err(e) => info!(%e, %path, "failed to load clip"),
        }
    }

    let layer = stack.active_mut().expect("active layer");
    let _listener = spawn_tracked(layer, Pose { x: 0.0, y: 0.0, ..Pose::default() });
    let orbiter = spawn_tracked(layer, Pose { x: 10.0, y: 0.0, width: 2.0, height: 2.0, ..Pose::default() });

    audio_engine.start().expect("start audio engine");

    let mut last = Instant::now();
    for tick in 0..TICKS {
        let layer = stack.active_mut().expect("active layer");
        let angle = (tick as f32) * 0.05;
        let (sin, cos) = angle.sin_cos();
        layer.entities.set_pose(orbiter, Pose { x: 10.0 * cos, y: 10.0 * sin, width: 2.0, height: 2.0, ..Pose::default() });

        let mut collisions = Vec::new();
        layer.run_tick(
            |_arena, _key| {},
            |a, b| collisions.push((a, b)),
        );
        for (a, b) in &collisions {
            info!(?a, ?b, "entities collided this tick");
        }

        let now = Instant::now();
        let elapsed = now - last;
        last = now;
        if elapsed < TARGET_FRAME {
            std::thread::sleep(TARGET_FRAME - elapsed);
        }
    }

    audio_engine.stop().expect("stop audio engine");
    info!("demo finished");
}

fn spawn_tracked(layer: &mut Layer<Arc<Mutex<audio_system::AudioState>>>, pose: Pose) -> EntityKey {
    let key = layer.spawn_child(layer.root, pose);
    layer.track(key);
    key
}
