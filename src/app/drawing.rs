use sdl2::rect::Rect;
use sdl2::render::Canvas;
use sdl2::video::Window;

use crate::constants;

/// Draws the Game Boy frame buffer, scaled up by `GB_SCALE_FACTOR`.
pub fn draw_gb_screen(canvas: &mut Canvas<Window>, frame_buffer: &[u8], target_x: i32, target_y: i32) {
    let expected_len = (constants::GB_WIDTH * constants::GB_HEIGHT) as usize;
    if frame_buffer.len() != expected_len {
        log::error!(
            "frame buffer size mismatch: expected {}, got {}",
            expected_len,
            frame_buffer.len()
        );
        return;
    }
    for y in 0..constants::GB_HEIGHT {
        for x in 0..constants::GB_WIDTH {
            let index = y * constants::GB_WIDTH + x;
            let shade_index = frame_buffer.get(index).copied().unwrap_or(0) % 4;
            let color = constants::PALETTE[shade_index as usize];

            canvas.set_draw_color(color);
            let rect = Rect::new(
                target_x + (x * constants::GB_SCALE_FACTOR as usize) as i32,
                target_y + (y * constants::GB_SCALE_FACTOR as usize) as i32,
                constants::GB_SCALE_FACTOR,
                constants::GB_SCALE_FACTOR,
            );
            if let Err(e) = canvas.fill_rect(rect) {
                log::warn!("failed to draw pixel: {}", e);
            }
        }
    }
}
