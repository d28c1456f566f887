//! The TamaGo console peripherals
#![warn(missing_docs)]
use std::{collections::HashMap, time::Duration};

mod audio;
mod controller;
mod screen;
mod serial;
mod store;

pub use controller::{Button, HELD, JUST_PRESSED, UP};
pub use screen::shade_to_argb;
pub use serial::Packet;
pub use store::FileStore;

use vm::{Engine, Program, Store};

/// Input to [`Console::update`], including all incoming events
#[derive(Default)]
pub struct Input {
    /// Buttons pressed
    pub pressed: Vec<Button>,

    /// Buttons released
    pub released: Vec<Button>,

    /// Incoming serial packet
    pub serial: Option<Packet>,
}

/// Output from [`Console::update`]
pub struct Output<'a> {
    /// Screen size, in pixels
    pub size: (u16, u16),

    /// Current screen contents, as `0xAARRGGBB` values
    pub frame: &'a [u32],

    /// Requested tone frequency in Hz, or 0 for silence
    pub tone: u16,

    /// Icon bitmask
    pub icons: u8,

    /// Packet sent by the program during this frame
    pub serial: Option<Packet>,

    /// Number of CPU cycles run during this frame
    pub cycles: usize,
}

/// Handle to the console peripherals
pub struct Console {
    screen: screen::Screen,
    controller: controller::Controller,
    audio: audio::Audio,
    serial: serial::Serial,
    store: Box<dyn Store>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Builds a console whose save data only lives in memory
    pub fn new() -> Self {
        Self::with_store(Box::new(HashMap::<String, String>::new()))
    }

    /// Builds a console persisting save data to the given store
    pub fn with_store(store: Box<dyn Store>) -> Self {
        Self {
            screen: screen::Screen::new(),
            controller: controller::Controller,
            audio: audio::Audio::default(),
            serial: serial::Serial::default(),
            store,
        }
    }

    /// Resets peripheral state and loads a program into the engine
    pub fn load(&mut self, vm: &mut Engine, program: &Program) {
        self.screen.reset();
        self.audio.reset();
        self.serial.reset();
        vm.load_program(program);
    }

    /// Returns the screen size, in pixels
    pub fn screen_size(&self) -> (u16, u16) {
        self.screen.size()
    }

    /// Returns the number of frames rendered since the last load
    pub fn frames(&self) -> u64 {
        self.screen.frames()
    }

    /// Borrows the save store
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Handles incoming events, then runs one frame
    ///
    /// `elapsed` is the wall time since the previous call.
    #[must_use]
    pub fn update(
        &mut self,
        vm: &mut Engine,
        elapsed: Duration,
        e: Input,
    ) -> Output<'_> {
        for b in &e.pressed {
            self.controller.pressed(vm, *b);
        }
        for b in &e.released {
            self.controller.released(vm, *b);
        }
        if let Some(p) = e.serial {
            self.serial.receive(p);
        }
        self.serial.deliver(vm);

        let cycles =
            vm.frame(elapsed, self.store.as_mut(), Some(&mut self.screen));
        if vm.is_running() {
            self.controller.age(vm);
        }

        Output {
            size: self.screen.size(),
            frame: self.screen.frame(),
            tone: self.audio.update(vm),
            icons: vm.memory().map().icons,
            serial: self.serial.poll(vm),
            cycles,
        }
    }
}
