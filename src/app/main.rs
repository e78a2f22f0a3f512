use std::{env, fs, path::Path, thread, time::Instant};

use sm83::Emulator;

mod constants;
mod drawing;
mod input;
mod sdl_setup;

fn main() -> Result<(), String> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <rom_path>", args[0]);
        std::process::exit(1);
    }
    let rom_path = Path::new(&args[1]);
    let rom_filename = rom_path.file_name().unwrap_or_default().to_string_lossy();
    let window_title = format!("sm83 - {}", rom_filename);

    let rom_data = fs::read(rom_path)
        .map_err(|e| format!("failed to read ROM '{}': {}", rom_path.display(), e))?;
    let mut emulator = Emulator::new(&rom_data).map_err(|e| e.to_string())?;

    let save_path = rom_path.with_extension("sav");
    if let Ok(save_data) = fs::read(&save_path) {
        emulator.load_ram(&save_data);
        log::info!("loaded save file: {}", save_path.display());
    }

    let mut sdl_context = sdl_setup::init_sdl(&window_title)?;

    'main_loop: loop {
        let frame_start_time = Instant::now();

        if input::handle_input(&mut sdl_context.event_pump, &mut emulator) {
            break 'main_loop;
        }

        let mut cycles_this_frame = 0u32;
        while cycles_this_frame < sm83::CYCLES_PER_FRAME {
            cycles_this_frame += emulator.step();
        }

        drawing::draw_gb_screen(&mut sdl_context.canvas, emulator.frame_buffer(), 0, 0);
        sdl_context.canvas.present();
        let _ = emulator.drain_audio_samples();

        let elapsed = frame_start_time.elapsed();
        if elapsed < constants::TARGET_FRAME_DURATION {
            thread::sleep(constants::TARGET_FRAME_DURATION - elapsed);
        }
    }

    if let Some(ram) = emulator.ram() {
        if let Err(e) = fs::write(&save_path, ram) {
            log::warn!("failed to write save file: {}", e);
        }
    }

    Ok(())
}
