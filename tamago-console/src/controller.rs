use vm::{memory::BUTTONS, Engine};

/// Button state byte: not pressed
pub const UP: u8 = 0;
/// Button state byte: pressed since the last frame
pub const JUST_PRESSED: u8 = 1;
/// Button state byte: pressed for at least one whole frame
pub const HELD: u8 = 2;

/// Physical button on the console
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Button {
    Left,
    Action,
    Right,
}

impl Button {
    /// Every button, in memory order
    pub const ALL: [Button; 3] = [Button::Left, Button::Action, Button::Right];

    /// Offset of this button's state byte in the button region
    pub fn index(self) -> usize {
        self as usize
    }
}

pub struct Controller;

impl Controller {
    /// Marks a button as just pressed, unless it's already down
    pub fn pressed(&mut self, vm: &mut Engine, b: Button) {
        let m = vm.memory_mut();
        if m.read_region(BUTTONS, b.index()) == UP {
            m.write_region(BUTTONS, b.index(), &[JUST_PRESSED]);
        }
    }

    /// Marks a button as released
    pub fn released(&mut self, vm: &mut Engine, b: Button) {
        vm.memory_mut().write_region(BUTTONS, b.index(), &[UP]);
    }

    /// Ages just-pressed buttons into held buttons
    ///
    /// This is called after every frame, so a program sees a press as
    /// [`JUST_PRESSED`] for exactly one frame.
    pub fn age(&mut self, vm: &mut Engine) {
        for v in vm.memory_mut().map_mut().buttons.iter_mut() {
            if *v == JUST_PRESSED {
                *v = HELD;
            }
        }
    }
}
