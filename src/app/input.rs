use sm83::{Button, Emulator};
use sdl2::EventPump;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

fn map_keycode(keycode: Keycode) -> Option<Button> {
    match keycode {
        Keycode::Right => Some(Button::Right),
        Keycode::Left => Some(Button::Left),
        Keycode::Up => Some(Button::Up),
        Keycode::Down => Some(Button::Down),
        Keycode::Z => Some(Button::A),
        Keycode::X => Some(Button::B),
        Keycode::RShift | Keycode::LShift => Some(Button::Select),
        Keycode::Return => Some(Button::Start),
        _ => None,
    }
}

/// Polls SDL events and updates the emulator's button state.
/// Returns `true` if the quit event was received, `false` otherwise.
pub fn handle_input(event_pump: &mut EventPump, emulator: &mut Emulator) -> bool {
    for event in event_pump.poll_iter() {
        match event {
            Event::Quit { .. }
            | Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => return true,
            Event::KeyDown {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(button) = map_keycode(key) {
                    emulator.set_button(button, true);
                }
            }
            Event::KeyUp {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(button) = map_keycode(key) {
                    emulator.set_button(button, false);
                }
            }
            _ => {}
        }
    }
    false
}
