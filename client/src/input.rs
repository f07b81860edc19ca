//! Input sources feeding the client loop
//!
//! A windowed front end would implement [`InputSource`] on top of its key
//! events. The sources here need no window, which is what the headless
//! client binary and the tests use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::InputState;

/// Supplies the key state for each frame.
pub trait InputSource {
    fn sample(&mut self) -> InputState;

    /// The client loop stops once this returns false.
    fn is_open(&self) -> bool;
}

/// Optional cap on how many frames a source produces.
#[derive(Debug, Clone, Copy)]
struct FrameLimit {
    remaining: Option<u64>,
}

impl FrameLimit {
    fn unlimited() -> Self {
        FrameLimit { remaining: None }
    }

    fn take(&mut self) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    fn is_open(&self) -> bool {
        self.remaining != Some(0)
    }
}

/// Plays a fixed list of key states, holding each for a number of frames,
/// and starts over at the end.
pub struct ScriptedInput {
    script: Vec<InputState>,
    frames_per_step: u32,
    frame: u64,
    limit: FrameLimit,
}

impl ScriptedInput {
    pub fn new(script: Vec<InputState>, frames_per_step: u32) -> Self {
        ScriptedInput {
            script,
            frames_per_step: frames_per_step.max(1),
            frame: 0,
            limit: FrameLimit::unlimited(),
        }
    }

    /// Walks a square: right, down, left, up.
    pub fn square(frames_per_side: u32) -> Self {
        let side = |up, down, left, right| InputState {
            up,
            down,
            left,
            right,
        };
        Self::new(
            vec![
                side(false, false, false, true),
                side(false, true, false, false),
                side(false, false, true, false),
                side(true, false, false, false),
            ],
            frames_per_side,
        )
    }

    /// Closes the source after `frames` samples.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit.remaining = Some(frames);
        self
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputState {
        self.limit.take();
        if self.script.is_empty() {
            return InputState::default();
        }

        let step = (self.frame / u64::from(self.frames_per_step)) % self.script.len() as u64;
        self.frame += 1;
        self.script[step as usize]
    }

    fn is_open(&self) -> bool {
        self.limit.is_open()
    }
}

/// Each key is independently held with probability one half.
pub fn random_keys<R: Rng + ?Sized>(rng: &mut R) -> InputState {
    InputState {
        up: rng.gen_bool(0.5),
        down: rng.gen_bool(0.5),
        left: rng.gen_bool(0.5),
        right: rng.gen_bool(0.5),
    }
}

/// Random key states, re-rolled every `hold_frames` frames.
pub struct RandomInput {
    rng: StdRng,
    hold_frames: u32,
    frame: u64,
    current: InputState,
    limit: FrameLimit,
}

impl RandomInput {
    pub fn new(hold_frames: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), hold_frames)
    }

    /// Reproducible sequence for a given seed.
    pub fn seeded(seed: u64, hold_frames: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), hold_frames)
    }

    fn with_rng(rng: StdRng, hold_frames: u32) -> Self {
        RandomInput {
            rng,
            hold_frames: hold_frames.max(1),
            frame: 0,
            current: InputState::default(),
            limit: FrameLimit::unlimited(),
        }
    }

    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit.remaining = Some(frames);
        self
    }
}

impl InputSource for RandomInput {
    fn sample(&mut self) -> InputState {
        self.limit.take();
        if self.frame % u64::from(self.hold_frames) == 0 {
            self.current = random_keys(&mut self.rng);
        }
        self.frame += 1;
        self.current
    }

    fn is_open(&self) -> bool {
        self.limit.is_open()
    }
}
