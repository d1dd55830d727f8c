//! Island demo
//!
//! A small outdoor scene exercising the whole frame pipeline: a terrain
//! patch and some huts casting shadows, a water quad sampling the
//! refraction pass, a campfire made of additive and alpha particle batches,
//! and a day cycle driving the sun. Resizing the window (or a stale surface
//! report) runs the recreate-and-retry path.

use ember_engine::prelude::*;
use glfw::WindowEvent;
use std::sync::Arc;
use std::time::Instant;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

/// Terrain grid with a gentle sine-based height field
fn terrain_mesh(size: u32, spacing: f32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let half = size as f32 * spacing * 0.5;

    let height = |x: f32, z: f32| (x * 0.15).sin() * 1.5 + (z * 0.2).cos() * 1.2;

    for row in 0..=size {
        for col in 0..=size {
            let x = col as f32 * spacing - half;
            let z = row as f32 * spacing - half;
            let y = height(x, z);
            // Central differences for the normal
            let dx = height(x + 0.1, z) - height(x - 0.1, z);
            let dz = height(x, z + 0.1) - height(x, z - 0.1);
            let normal = nalgebra::Vector3::new(-dx / 0.2, 1.0, -dz / 0.2).normalize();
            vertices.push(Vertex {
                position: [x, y, z],
                normal: [normal.x, normal.y, normal.z],
                uv: [col as f32 / size as f32 * 8.0, row as f32 / size as f32 * 8.0],
            });
        }
    }
    for row in 0..size {
        for col in 0..size {
            let i = row * (size + 1) + col;
            indices.extend_from_slice(&[i, i + size + 1, i + 1, i + 1, i + size + 1, i + size + 2]);
        }
    }
    (vertices, indices)
}

/// Unit cube centered on the origin
fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0], [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]]),
        ([0.0, 0.0, -1.0], [[1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [1.0, 1.0, -1.0]]),
        ([1.0, 0.0, 0.0], [[1.0, -1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [1.0, 1.0, 1.0]]),
        ([-1.0, 0.0, 0.0], [[-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0]]),
        ([0.0, 1.0, 0.0], [[-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0]]),
        ([0.0, -1.0, 0.0], [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, -1.0, 1.0], [-1.0, -1.0, 1.0]]),
    ];
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for (normal, corners) in faces {
        let base = vertices.len() as u32;
        for (i, corner) in corners.iter().enumerate() {
            let uv = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]][i];
            vertices.push(Vertex {
                position: [corner[0] * 0.5, corner[1] * 0.5, corner[2] * 0.5],
                normal,
                uv,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Flat quad for the water surface
fn quad_mesh(half: f32) -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        Vertex { position: [-half, 0.0, -half], normal: [0.0, 1.0, 0.0], uv: [0.0, 0.0] },
        Vertex { position: [half, 0.0, -half], normal: [0.0, 1.0, 0.0], uv: [4.0, 0.0] },
        Vertex { position: [half, 0.0, half], normal: [0.0, 1.0, 0.0], uv: [4.0, 4.0] },
        Vertex { position: [-half, 0.0, half], normal: [0.0, 1.0, 0.0], uv: [0.0, 4.0] },
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];
    (vertices, indices)
}

fn campfire_particles(time: f32, flame_tex: &Arc<str>, smoke_tex: &Arc<str>) -> Vec<ParticleBatch> {
    let fire_base = [6.0_f32, 1.2, 4.0];
    let mut flames = Vec::new();
    for i in 0..24 {
        let phase = time * 2.0 + i as f32 * 0.7;
        let rise = (phase % 1.0) * 1.6;
        flames.push(ParticleInstance {
            position: [
                fire_base[0] + (phase * 3.1).sin() * 0.18,
                fire_base[1] + rise,
                fire_base[2] + (phase * 2.3).cos() * 0.18,
            ],
            size: 0.35 * (1.0 - rise / 1.8),
            color: [1.0, 0.55 - rise * 0.2, 0.12, 0.9],
        });
    }
    let mut smoke = Vec::new();
    for i in 0..12 {
        let phase = time * 0.8 + i as f32 * 1.3;
        let rise = (phase % 1.0) * 3.0 + 1.4;
        smoke.push(ParticleInstance {
            position: [
                fire_base[0] + (phase * 1.4).sin() * 0.4,
                fire_base[1] + rise,
                fire_base[2] + (phase * 1.1).cos() * 0.4,
            ],
            size: 0.5 + rise * 0.15,
            color: [0.35, 0.35, 0.38, 0.3 * (1.0 - rise / 4.5)],
        });
    }
    // Registration order: flames first, smoke second
    vec![
        ParticleBatch {
            blend: ParticleBlend::Additive,
            texture: Some(flame_tex.clone()),
            instances: flames,
        },
        ParticleBatch {
            blend: ParticleBlend::Alpha,
            texture: Some(smoke_tex.clone()),
            instances: smoke,
        },
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = RendererConfig::default();
    let mut window = Window::new("island", WINDOW_WIDTH, WINDOW_HEIGHT)?;
    let mut renderer = Renderer::new(&mut window, &config)?;

    // Procedural textures shared through the cache by string key
    renderer.register_procedural_texture(
        "grass",
        &ProceduralSpec::Checkerboard {
            size: 64,
            cells: 8,
            light: [92, 140, 60, 255],
            dark: [70, 116, 48, 255],
        },
    )?;
    renderer.register_procedural_texture(
        "hut_wall",
        &ProceduralSpec::Solid {
            rgba: [158, 122, 84, 255],
        },
    )?;
    renderer.register_procedural_texture(
        "water",
        &ProceduralSpec::Gradient {
            size: 32,
            top: [38, 92, 130, 210],
            bottom: [20, 52, 86, 210],
        },
    )?;
    renderer.register_procedural_texture(
        "flame",
        &ProceduralSpec::Solid {
            rgba: [255, 200, 120, 255],
        },
    )?;
    renderer.register_procedural_texture(
        "smoke",
        &ProceduralSpec::Solid {
            rgba: [120, 120, 124, 255],
        },
    )?;

    let (terrain_vertices, terrain_indices) = terrain_mesh(48, 1.0);
    let terrain = renderer.upload_mesh(&terrain_vertices, &terrain_indices)?;
    let (cube_vertices, cube_indices) = cube_mesh();
    let cube = renderer.upload_mesh(&cube_vertices, &cube_indices)?;
    let (water_vertices, water_indices) = quad_mesh(9.0);
    let water = renderer.upload_mesh(&water_vertices, &water_indices)?;

    let grass: Arc<str> = Arc::from("grass");
    let hut_wall: Arc<str> = Arc::from("hut_wall");
    let water_tex: Arc<str> = Arc::from("water");
    let flame_tex: Arc<str> = Arc::from("flame");
    let smoke_tex: Arc<str> = Arc::from("smoke");

    let mut items = vec![
        DrawItem {
            transform: Mat4::identity(),
            mesh: terrain,
            texture: Some(grass),
            visible: true,
            casts_shadow: true,
            receives_shadow: true,
            shading: ShadingMode::Standard,
            layers: LayerMask::OUTSIDE,
            burn_factor: 0.0,
        },
        DrawItem {
            transform: Mat4::new_translation(&Vec3::new(-12.0, 3.0, -8.0))
                * Mat4::new_scaling(4.0),
            mesh: cube,
            texture: Some(hut_wall.clone()),
            visible: true,
            casts_shadow: true,
            receives_shadow: true,
            shading: ShadingMode::Standard,
            layers: LayerMask::OUTSIDE,
            burn_factor: 0.0,
        },
        // The same hut, furnished for interior views only
        DrawItem {
            transform: Mat4::new_translation(&Vec3::new(-12.0, 3.0, -8.0))
                * Mat4::new_scaling(3.6),
            mesh: cube,
            texture: Some(hut_wall),
            visible: true,
            casts_shadow: false,
            receives_shadow: false,
            shading: ShadingMode::Flat,
            layers: LayerMask::INSIDE,
            burn_factor: 0.0,
        },
        DrawItem {
            transform: Mat4::new_translation(&Vec3::new(14.0, -0.4, 10.0)),
            mesh: water,
            texture: Some(water_tex),
            visible: true,
            casts_shadow: false,
            receives_shadow: false,
            shading: ShadingMode::Water,
            layers: LayerMask::OUTSIDE,
            burn_factor: 0.0,
        },
    ];

    let start = Instant::now();
    let mut needs_recreate = false;

    while !window.should_close() {
        window.poll_events();
        let events: Vec<_> = window.flush_events().collect();
        for (_, event) in events {
            match event {
                WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    window.set_should_close(true);
                }
                WindowEvent::FramebufferSize(_, _) => {
                    needs_recreate = true;
                }
                _ => {}
            }
        }

        if needs_recreate {
            let (width, height) = window.get_framebuffer_size();
            if width == 0 || height == 0 {
                continue; // minimized; wait for a real size
            }
            log::info!("Recreating swapchain resources at {}x{}", width, height);
            renderer.recreate_swapchain_resources(width, height)?;
            needs_recreate = false;
        }

        let time = start.elapsed().as_secs_f32();

        // Day cycle: the sun sweeps overhead, shifting color towards dusk
        let sun_angle = time * 0.1;
        let sun = SunLight {
            direction: Vec3::new(sun_angle.cos() * 0.6, -1.0, sun_angle.sin() * 0.4).normalize(),
            height: 120.0,
            color: [1.0, 0.93 + 0.05 * sun_angle.sin(), 0.85],
            intensity: 1.0,
            ambient: 0.28,
        };

        // A slowly smoldering hut
        items[1].burn_factor = (time * 0.02).min(0.6);

        let particles = campfire_particles(time, &flame_tex, &smoke_tex);
        let snapshot = SceneSnapshot {
            items: &items,
            particles: &particles,
            sun,
            clear_color: [0.05, 0.07, 0.12, 1.0],
        };

        let orbit = time * 0.15;
        let eye = Vec3::new(orbit.cos() * 30.0, 14.0, orbit.sin() * 30.0);
        let (width, height) = renderer.swapchain_extent();
        let inputs = FrameInputs {
            view: look_at(eye, Vec3::new(0.0, 2.0, 0.0), Vec3::y()),
            proj: perspective_vk(
                std::f32::consts::FRAC_PI_3,
                width as f32 / height as f32,
                0.1,
                400.0,
            ),
            layers: LayerMask::OUTSIDE,
        };

        match renderer.draw_frame(&snapshot, &inputs)? {
            FrameOutcome::Presented => {}
            FrameOutcome::SwapchainStale => {
                needs_recreate = true;
            }
        }
    }

    renderer.wait_idle()?;
    Ok(())
}
