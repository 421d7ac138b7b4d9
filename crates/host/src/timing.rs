/// Fixed-rate generation clock driven by variable frame times.
#[derive(Debug, Clone)]
pub struct FrameTiming {
    pub frame_count: u64,
    pub last_dt: f32,
    /// Simulated seconds since start, wrapped by the renderer for shader time.
    pub elapsed: f64,
    pub tick_accumulator: f32,
    /// Generations per simulated second.
    pub tick_rate: f32,
    /// Cap on generations run in a single frame.
    pub max_ticks: u32,
    pub paused: bool,
    pub single_step: bool,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl FrameTiming {
    pub fn new(tick_rate: f32) -> Self {
        Self {
            frame_count: 0,
            last_dt: 0.0,
            elapsed: 0.0,
            tick_accumulator: 0.0,
            tick_rate: tick_rate.clamp(0.1, 240.0),
            max_ticks: 3,
            paused: false,
            single_step: false,
        }
    }

    /// Advances the clock by one frame of `dt` seconds and returns how many
    /// generations are due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.frame_count += 1;
        self.last_dt = dt;
        self.elapsed += f64::from(dt);
        self.ticks_due(dt)
    }

    fn ticks_due(&mut self, dt: f32) -> u32 {
        if self.paused && !self.single_step {
            return 0;
        }
        if self.single_step {
            self.single_step = false;
            return 1;
        }

        let interval = 1.0 / self.tick_rate;
        self.tick_accumulator += dt;

        // Too far behind: run the cap and drop the backlog.
        if self.tick_accumulator > interval * self.max_ticks as f32 {
            self.tick_accumulator = 0.0;
            return self.max_ticks;
        }

        let mut ticks = 0;
        while self.tick_accumulator >= interval && ticks < self.max_ticks {
            self.tick_accumulator -= interval;
            ticks += 1;
        }
        ticks
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn request_single_step(&mut self) {
        self.single_step = true;
    }

    pub fn set_tick_rate(&mut self, rate: f32) {
        self.tick_rate = rate.clamp(0.1, 240.0);
    }
}
