//! Moving colour-bar source for dry runs.

use trigger5_core::{FrameSource, FrameSurface, Trigger5Error};

const BARS: [u32; 8] = [
    0x00FF_FFFF, 0x00FF_FF00, 0x0000_FFFF, 0x0000_FF00,
    0x00FF_00FF, 0x00FF_0000, 0x0000_00FF, 0x0000_0000,
];

/// Eight vertical colour bars that scroll one bar per frame.
#[derive(Debug)]
pub struct TestPattern {
    surface: FrameSurface,
    frame: usize,
}

impl TestPattern {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            surface: FrameSurface::xrgb8888(width, height),
            frame: 0,
        }
    }

    fn draw(&mut self) {
        let width = usize::from(self.surface.width).max(1);
        for y in 0..self.surface.height {
            for x in 0..self.surface.width {
                let bar = usize::from(x) * BARS.len() / width;
                let colour = BARS[(bar + self.frame) % BARS.len()];
                self.surface.put_pixel(x, y, colour);
            }
        }
    }
}

impl FrameSource for TestPattern {
    fn current_frame(&mut self) -> Result<FrameSurface, Trigger5Error> {
        self.draw();
        self.frame += 1;
        Ok(self.surface.clone())
    }
}
