//! Client-side prediction and server reconciliation

use log::debug;
use shared::{advance, Bounds, ClientInput, EntityId, FloatVector, InputState, WorldSnapshot};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::ClientConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The server never drops a live connection's entity, so this means
    /// the two sides disagree about who we are.
    #[error("snapshot does not contain the local player {0}")]
    LocalPlayerMissing(EntityId),
}

/// What the front end needs to draw one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitView {
    pub id: EntityId,
    pub position: FloatVector,
}

/// Re-applies every input the server has not acknowledged yet on top of
/// an authoritative position, in the order they were sent.
pub fn replay(
    base: FloatVector,
    last_acked_seq: i64,
    unacked: &[ClientInput],
    bounds: &Bounds,
) -> FloatVector {
    unacked
        .iter()
        .filter(|input| input.sequence > last_acked_seq)
        .fold(base, |position, input| {
            advance(position, &input.input, input.elapsed, bounds)
        })
}

pub struct PredictionEngine {
    my_player_id: EntityId,
    units: BTreeMap<EntityId, FloatVector>,
    /// Sent inputs not yet covered by a snapshot, oldest first.
    unacked: Vec<ClientInput>,
    next_sequence: i64,
    bounds: Bounds,
    max_dt: Duration,
}

impl PredictionEngine {
    pub fn new(my_player_id: EntityId, config: &ClientConfig) -> Self {
        PredictionEngine {
            my_player_id,
            units: BTreeMap::new(),
            unacked: Vec::new(),
            next_sequence: 0,
            bounds: config.bounds,
            max_dt: config.max_dt,
        }
    }

    pub fn player_id(&self) -> EntityId {
        self.my_player_id
    }

    /// Predicts one frame of local input and returns the message to send,
    /// or `None` when no key is held.
    ///
    /// `elapsed` is clamped to the same maximum step the server applies, and
    /// the clamped value is what gets sent.
    pub fn step(&mut self, input: InputState, elapsed: Duration) -> Option<ClientInput> {
        if !input.any() {
            return None;
        }

        let elapsed = elapsed.min(self.max_dt);
        if let Some(position) = self.units.get_mut(&self.my_player_id) {
            *position = advance(*position, &input, elapsed, &self.bounds);
        }

        let message = ClientInput::new(self.my_player_id, self.next_sequence, input, elapsed);
        self.unacked.push(message.clone());
        self.next_sequence += 1;
        Some(message)
    }

    /// Brings local state in line with an authoritative snapshot.
    ///
    /// Units seen for the first time are placed where the server says and
    /// left alone until the next snapshot. Our own unit is re-based on the
    /// server position and replayed forward; everyone else is snapped.
    /// Units missing from the snapshot are dropped.
    pub fn apply_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<(), ReconcileError> {
        if snapshot.entity(self.my_player_id).is_none() {
            return Err(ReconcileError::LocalPlayerMissing(self.my_player_id));
        }

        for reported in &snapshot.entities {
            let Some(position) = self.units.get_mut(&reported.id) else {
                debug!("Spawning unit {} at {:?}", reported.id, reported.position);
                self.units.insert(reported.id, reported.position);
                continue;
            };

            if reported.id != self.my_player_id {
                *position = reported.position;
                continue;
            }

            self.unacked
                .retain(|input| input.sequence > reported.last_acked_seq);
            let reconciled = replay(
                reported.position,
                reported.last_acked_seq,
                &self.unacked,
                &self.bounds,
            );

            if reconciled != *position {
                debug!(
                    "Corrected prediction from {:?} to {:?} ({} inputs replayed)",
                    *position,
                    reconciled,
                    self.unacked.len()
                );
            }
            *position = reconciled;
        }

        self.units
            .retain(|id, _| snapshot.entity(*id).is_some());

        Ok(())
    }

    pub fn position(&self, id: EntityId) -> Option<FloatVector> {
        self.units.get(&id).copied()
    }

    /// Every known unit, ordered by id.
    pub fn units(&self) -> Vec<UnitView> {
        self.units
            .iter()
            .map(|(&id, &position)| UnitView { id, position })
            .collect()
    }

    pub fn unacked(&self) -> &[ClientInput] {
        &self.unacked
    }

    pub fn next_sequence(&self) -> i64 {
        self.next_sequence
    }
}
