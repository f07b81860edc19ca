use shared::{EntityId, FloatVector, SnapshotEntity, Timestamp, NO_SEQUENCE};

use crate::registry::Registry;

/// Authoritative state of one connected player.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub position: FloatVector,
    /// Highest input sequence applied so far, `NO_SEQUENCE` before the first one.
    pub last_acked_seq: i64,
    /// When the last input for this entity was received, applied or not.
    pub last_acked_at: Timestamp,
}

impl Entity {
    pub fn spawn(id: EntityId, position: FloatVector, now: Timestamp) -> Self {
        Entity {
            id,
            position,
            last_acked_seq: NO_SEQUENCE,
            last_acked_at: now,
        }
    }

    pub fn to_snapshot(&self) -> SnapshotEntity {
        SnapshotEntity {
            id: self.id,
            position: self.position,
            last_acked_seq: self.last_acked_seq,
        }
    }
}

pub type EntityRegistry = Registry<Entity>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SPAWN_POSITION;

    #[test]
    fn test_spawn_defaults() {
        let now = Timestamp::from_millis(10);
        let entity = Entity::spawn(4, SPAWN_POSITION, now);

        assert_eq!(entity.id, 4);
        assert_eq!(entity.position, SPAWN_POSITION);
        assert_eq!(entity.last_acked_seq, NO_SEQUENCE);
        assert_eq!(entity.last_acked_at, now);
    }

    #[test]
    fn test_to_snapshot() {
        let mut entity = Entity::spawn(2, FloatVector::new(1.0, 2.0), Timestamp(0));
        entity.last_acked_seq = 9;

        let snapshot = entity.to_snapshot();
        assert_eq!(snapshot.id, 2);
        assert_eq!(snapshot.position, FloatVector::new(1.0, 2.0));
        assert_eq!(snapshot.last_acked_seq, 9);
    }
}
