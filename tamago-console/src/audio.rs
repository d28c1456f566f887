use log::debug;
use vm::Engine;

/// Audio register readout
///
/// The console only reports the requested frequency; synthesizing it is up to
/// the host.
#[derive(Default)]
pub struct Audio {
    tone: u16,
}

impl Audio {
    pub fn reset(&mut self) {
        self.tone = 0;
    }

    /// Reads the frequency register, returning the current tone in Hz
    pub fn update(&mut self, vm: &Engine) -> u16 {
        let tone = vm.memory().map().audio.get();
        if tone != self.tone {
            if tone == 0 {
                debug!("tone off");
            } else {
                debug!("tone {tone} Hz");
            }
            self.tone = tone;
        }
        tone
    }
}
