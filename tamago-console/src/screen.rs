use vm::{
    memory::{DISPLAY_HEIGHT, DISPLAY_WIDTH},
    Renderer,
};

/// Framebuffer renderer
///
/// Pixels are stored as `0xAARRGGBB`; shade 0 becomes fully transparent.
pub struct Screen {
    buffer: Vec<u32>,

    /// Number of frames rendered since the last reset
    frames: u64,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    pub fn new() -> Self {
        Self {
            buffer: vec![0; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            frames: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.frames = 0;
    }

    pub fn size(&self) -> (u16, u16) {
        (DISPLAY_WIDTH as u16, DISPLAY_HEIGHT as u16)
    }

    pub fn frame(&self) -> &[u32] {
        &self.buffer
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Converts a shade into an `0xAARRGGBB` pixel
#[inline]
pub fn shade_to_argb(shade: u8, palette: &[u32; 3]) -> u32 {
    match shade {
        1..=3 => 0xFF000000 | palette[usize::from(shade) - 1],
        _ => 0,
    }
}

impl Renderer for Screen {
    fn render(&mut self, video: &[u8], palette: &[u32; 3]) {
        for (o, &v) in self.buffer.iter_mut().zip(video) {
            *o = shade_to_argb(v, palette);
        }
        self.frames += 1;
    }
}
