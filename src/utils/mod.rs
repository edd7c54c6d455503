use std::time::Instant;

/// Wall-time timer based on std::time::Instant
pub struct Timer {
    time: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Timer {
            time: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.time.elapsed().as_secs_f32()
    }
}
