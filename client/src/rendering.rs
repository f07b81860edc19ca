use log::debug;
use shared::EntityId;

use crate::game::UnitView;

/// Draws the current units once per frame. `me` is the local player's id.
pub trait Renderer {
    fn render(&mut self, units: &[UnitView], me: EntityId);
}

/// Logs unit positions at debug level every `every` frames.
pub struct LogRenderer {
    every: u64,
    frame: u64,
}

impl LogRenderer {
    pub fn new(every: u64) -> Self {
        LogRenderer {
            every: every.max(1),
            frame: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frame
    }

    fn due(&mut self) -> bool {
        let due = self.frame % self.every == 0;
        self.frame += 1;
        due
    }
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new(60)
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, units: &[UnitView], me: EntityId) {
        if !self.due() {
            return;
        }

        for unit in units {
            let marker = if unit.id == me { " (you)" } else { "" };
            debug!(
                "Unit {}{} at ({:.1}, {:.1})",
                unit.id, marker, unit.position.x, unit.position.y
            );
        }
    }
}
