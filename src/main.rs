use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use sdl2::keyboard::Keycode;

use scanline::display::{Display, Framebuffer, InputEvent, RenderTarget, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use scanline::pool::WorkerPool;
use scanline::renderer::Renderer;
use scanline::resources::ResourceManager;
use scanline::scene::Scene;
use scanline::util::FpsCounter;

/// Camera fly speed in units per second
const MOVE_SPEED: f32 = 5.0;

struct Args {
    width: u32,
    height: u32,
    scene: PathBuf,
    vsync: bool,
    headless: bool,
    frames: u32,
    output: PathBuf,
}

/// Parse command line arguments
fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args {
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
        scene: PathBuf::from("scenes/scene.json"),
        vsync: true,
        headless: false,
        frames: 1,
        output: PathBuf::from("output.tga"),
    };

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--no-vsync" => args.vsync = false,
            "--headless" => args.headless = true,
            "--width" | "-w" => {
                if i + 1 < argv.len() {
                    if let Ok(w) = argv[i + 1].parse::<u32>() {
                        args.width = w;
                    }
                    i += 1;
                }
            }
            "--height" | "-h" => {
                if i + 1 < argv.len() {
                    if let Ok(h) = argv[i + 1].parse::<u32>() {
                        args.height = h;
                    }
                    i += 1;
                }
            }
            "--resolution" | "-r" => {
                if i + 1 < argv.len() {
                    // Parse WxH format (e.g., 1920x1080)
                    let parts: Vec<&str> = argv[i + 1].split('x').collect();
                    if parts.len() == 2 {
                        if let (Ok(w), Ok(h)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>())
                        {
                            args.width = w;
                            args.height = h;
                        }
                    }
                    i += 1;
                }
            }
            "--scene" | "-s" => {
                if i + 1 < argv.len() {
                    args.scene = PathBuf::from(&argv[i + 1]);
                    i += 1;
                }
            }
            "--frames" | "-n" => {
                if i + 1 < argv.len() {
                    if let Ok(n) = argv[i + 1].parse::<u32>() {
                        args.frames = n.max(1);
                    }
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < argv.len() {
                    args.output = PathBuf::from(&argv[i + 1]);
                    i += 1;
                }
            }
            "--help" => {
                println!("Usage: scanline [OPTIONS]");
                println!();
                println!("Options:");
                println!(
                    "  --width W, -w W           Framebuffer width (default: {DEFAULT_WIDTH})"
                );
                println!(
                    "  --height H, -h H          Framebuffer height (default: {DEFAULT_HEIGHT})"
                );
                println!("  --resolution WxH, -r WxH  Set resolution (e.g., 1920x1080)");
                println!("  --scene PATH, -s PATH     Scene file (default: scenes/scene.json)");
                println!("  --no-vsync                Disable VSync for uncapped framerate");
                println!("  --headless                Render without a window and save a TGA");
                println!("  --frames N, -n N          Frames to advance in headless mode");
                println!("  --output PATH, -o PATH    Headless output file (default: output.tga)");
                println!("  --help                    Show this help message");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    args
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let aspect = args.width as f32 / args.height as f32;

    let pool = Arc::new(WorkerPool::with_default_threads());
    info!(
        "scanline {}x{}, {} worker threads",
        args.width,
        args.height,
        pool.num_threads()
    );

    let framebuffer = Arc::new(Framebuffer::new(args.width as usize, args.height as usize));
    let mut resources = ResourceManager::new();
    let mut scene = Scene::load(&args.scene, aspect, &mut resources);
    let mut renderer = Renderer::new(Arc::clone(&framebuffer), Arc::clone(&pool));

    if args.headless {
        run_headless(&args, &mut scene, &mut renderer, &framebuffer)
    } else {
        run_windowed(&args, &mut scene, &mut renderer, &framebuffer, &pool)
    }
}

/// Render a fixed number of frames at a nominal 60 Hz step and save the
/// last one as a TGA.
fn run_headless(
    args: &Args,
    scene: &mut Scene,
    renderer: &mut Renderer,
    framebuffer: &Framebuffer,
) -> Result<(), String> {
    const STEP: f32 = 1.0 / 60.0;

    for _ in 0..args.frames {
        scene.update(STEP);
        scene.render(renderer).map_err(|e| e.to_string())?;
    }

    framebuffer
        .save_tga(&args.output)
        .map_err(|e| e.to_string())?;
    info!("rendered image saved to {}", args.output.display());
    Ok(())
}

fn run_windowed(
    args: &Args,
    scene: &mut Scene,
    renderer: &mut Renderer,
    framebuffer: &Framebuffer,
    pool: &WorkerPool,
) -> Result<(), String> {
    let (mut display, texture_creator) =
        Display::with_options("scanline", args.width, args.height, args.vsync)?;
    let mut target = RenderTarget::with_size(&texture_creator, args.width, args.height)?;

    let mut fps_counter = FpsCounter::new(60);
    let mut mouse_look = true;
    display.set_relative_mouse_mode(true);

    let mut held = std::collections::HashSet::new();
    let mut title_timer = 0.0f32;

    'main: loop {
        let (dt, _current_fps, avg_fps) = fps_counter.tick();

        for event in display.poll_events() {
            match event {
                InputEvent::Quit => break 'main,
                InputEvent::KeyDown(Keycode::Escape) => {
                    // Toggle between mouse look and a free cursor
                    mouse_look = !mouse_look;
                    display.set_relative_mouse_mode(mouse_look);
                }
                InputEvent::KeyDown(Keycode::Q) => break 'main,
                InputEvent::KeyDown(k) => {
                    held.insert(k);
                }
                InputEvent::KeyUp(k) => {
                    held.remove(&k);
                }
                InputEvent::MouseMove { xrel, yrel } => {
                    if mouse_look {
                        scene
                            .camera
                            .process_mouse_movement(-(xrel as f32), -(yrel as f32));
                    }
                }
            }
        }

        // WASD fly movement, space/ctrl for up/down
        let axis = |pos: Keycode, neg: Keycode| -> f32 {
            (held.contains(&pos) as i32 - held.contains(&neg) as i32) as f32
        };
        let forward = axis(Keycode::W, Keycode::S) * MOVE_SPEED * dt;
        let right = axis(Keycode::D, Keycode::A) * MOVE_SPEED * dt;
        let up = axis(Keycode::Space, Keycode::LCtrl) * MOVE_SPEED * dt;
        if forward != 0.0 || right != 0.0 || up != 0.0 {
            scene.camera.move_local(forward, right, up);
        }

        scene.update(dt);
        if let Err(e) = scene.render(renderer) {
            error!("frame aborted: {e}");
            return Err(e.to_string());
        }

        let rgb = framebuffer.to_rgb24(pool);
        display.present(&mut target, &rgb)?;

        title_timer += dt;
        if title_timer >= 0.5 {
            title_timer = 0.0;
            display.set_title(&format!(
                "scanline - {:.0} fps ({:.1} ms)",
                avg_fps,
                fps_counter.avg_frame_time_ms()
            ));
        }
    }

    Ok(())
}
