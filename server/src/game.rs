//! Authoritative tick loop
//!
//! Each tick drains the message queue, validates and applies every input in
//! arrival order, then broadcasts a snapshot of all entities to all clients.

use log::{debug, error, info, warn};
use shared::{
    advance, encode, Bounds, ClientInput, FloatVector, Message, MessageQueue, Timestamp,
    WorldSnapshot,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::{ClientRegistry, Delivery};
use crate::config::{InputLimits, ServerConfig};
use crate::entity::{Entity, EntityRegistry};

const STATS_INTERVAL_TICKS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputVerdict {
    Applied { displacement: FloatVector },
    /// The input claimed more time than passed since the previous one.
    Rejected {
        claimed: Duration,
        observed_gap: Duration,
    },
}

/// Validates `input` against the time since the entity's previous input and applies it.
///
/// Either way the entity's `last_acked_at` moves to `received_at`, so the
/// next input's gap is measured from here. A rejected input changes nothing else.
pub fn apply_input(
    entity: &mut Entity,
    input: &ClientInput,
    received_at: Timestamp,
    limits: &InputLimits,
    bounds: &Bounds,
) -> InputVerdict {
    let observed_gap = received_at.duration_since(entity.last_acked_at);
    entity.last_acked_at = received_at;

    if input.elapsed > observed_gap + limits.max_dt_diff {
        return InputVerdict::Rejected {
            claimed: input.elapsed,
            observed_gap,
        };
    }

    let elapsed = input.elapsed.min(limits.max_dt);
    let before = entity.position;
    entity.position = advance(before, &input.input, elapsed, bounds);

    // Late arrivals still move the entity but never roll the ack back.
    if input.sequence > entity.last_acked_seq {
        entity.last_acked_seq = input.sequence;
    }

    InputVerdict::Applied {
        displacement: entity.position - before,
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub applied: usize,
    pub rejected: usize,
    /// Inputs for entities that are gone, and messages that are not inputs.
    pub dropped: usize,
    /// Clients the snapshot was queued for.
    pub recipients: usize,
    /// Clients whose outbound queue was full, so this snapshot was skipped for them.
    pub lagging: usize,
}

pub struct TickEngine {
    entities: Arc<EntityRegistry>,
    clients: Arc<ClientRegistry>,
    queue: Arc<MessageQueue>,
    limits: InputLimits,
    bounds: Bounds,
    tick_period: Duration,
    tick: u64,
    totals: TickReport,
}

impl TickEngine {
    pub fn new(
        config: &ServerConfig,
        entities: Arc<EntityRegistry>,
        clients: Arc<ClientRegistry>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        TickEngine {
            entities,
            clients,
            queue,
            limits: config.limits,
            bounds: config.bounds,
            tick_period: config.tick_period,
            tick: 0,
            totals: TickReport::default(),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Runs one tick: drain, apply, broadcast.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for message in self.queue.pop_all() {
            match message {
                Message::ClientInput(input) => self.process_input(&input, &mut report),
                other => {
                    warn!(
                        "Ignoring {:?} message in tick queue",
                        other.message_type()
                    );
                    report.dropped += 1;
                }
            }
        }

        self.broadcast_snapshot(&mut report);
        self.tick += 1;
        self.record(report);
        report
    }

    fn process_input(&self, input: &ClientInput, report: &mut TickReport) {
        let received_at = input.received_at.unwrap_or_else(Timestamp::now);
        let limits = self.limits;
        let bounds = self.bounds;

        let verdict = self.entities.update(input.player_id, |entity| {
            apply_input(entity, input, received_at, &limits, &bounds)
        });

        match verdict {
            Some(InputVerdict::Applied { .. }) => report.applied += 1,
            Some(InputVerdict::Rejected {
                claimed,
                observed_gap,
            }) => {
                debug!(
                    "Rejected input {} from player {}: claimed {:?} but only {:?} passed",
                    input.sequence, input.player_id, claimed, observed_gap
                );
                report.rejected += 1;
            }
            None => {
                debug!(
                    "Dropping input {} for departed player {}",
                    input.sequence, input.player_id
                );
                report.dropped += 1;
            }
        }
    }

    /// Current state of every entity.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot::new(
            self.entities
                .snapshot()
                .iter()
                .map(Entity::to_snapshot)
                .collect(),
        )
    }

    /// Queues the snapshot for every connected client without waiting on any of them.
    fn broadcast_snapshot(&self, report: &mut TickReport) {
        let clients = self.clients.snapshot();
        if clients.is_empty() {
            return;
        }

        let bytes: Arc<[u8]> = match encode(&Message::from(self.snapshot())) {
            Ok(bytes) => Arc::from(bytes),
            Err(e) => {
                error!("Failed to encode world snapshot: {}", e);
                return;
            }
        };

        for client in &clients {
            match client.send(Arc::clone(&bytes)) {
                Delivery::Queued => report.recipients += 1,
                Delivery::Dropped => report.lagging += 1,
                Delivery::Closed => {
                    debug!("Player {} is no longer accepting snapshots", client.id)
                }
            }
        }
    }

    fn record(&mut self, report: TickReport) {
        self.totals.applied += report.applied;
        self.totals.rejected += report.rejected;
        self.totals.dropped += report.dropped;
        self.totals.lagging += report.lagging;

        if self.tick % STATS_INTERVAL_TICKS == 0 && !self.clients.is_empty() {
            debug!(
                "Tick {}: {} clients, {} applied, {} rejected, {} dropped, {} snapshots skipped so far",
                self.tick,
                self.clients.len(),
                self.totals.applied,
                self.totals.rejected,
                self.totals.dropped,
                self.totals.lagging
            );
        }
    }

    /// Ticks forever, sleeping off whatever is left of each period.
    ///
    /// A slow tick shortens the following sleep to zero instead of
    /// scheduling catch-up ticks.
    pub async fn run(mut self) {
        info!("Tick loop running every {:?}", self.tick_period);

        loop {
            let started = Instant::now();
            self.tick();
            let spent = started.elapsed();
            tokio::time::sleep(self.tick_period.saturating_sub(spent)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientHandle, Outbound};
    use assert_approx_eq::assert_approx_eq;
    use shared::{decode, AssignIdentity, InputState, ARENA, NO_SEQUENCE, SPAWN_POSITION};
    use tokio::sync::mpsc;

    const T0: Timestamp = Timestamp(1_000_000_000);

    fn right() -> InputState {
        InputState {
            right: true,
            ..InputState::default()
        }
    }

    fn left() -> InputState {
        InputState {
            left: true,
            ..InputState::default()
        }
    }

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn input(player_id: u64, sequence: i64, keys: InputState, elapsed_ms: u64) -> ClientInput {
        ClientInput::new(player_id, sequence, keys, millis(elapsed_ms))
    }

    fn entity() -> Entity {
        Entity::spawn(1, FloatVector::new(100.0, 100.0), T0)
    }

    fn apply(entity: &mut Entity, input: &ClientInput, at_ms: u64) -> InputVerdict {
        apply_input(
            entity,
            input,
            T0 + millis(at_ms),
            &InputLimits::default(),
            &ARENA,
        )
    }

    #[test]
    fn test_rejects_elapsed_beyond_observed_gap() {
        let mut entity = entity();

        let verdict = apply(&mut entity, &input(1, 0, right(), 50), 10);

        assert_eq!(
            verdict,
            InputVerdict::Rejected {
                claimed: millis(50),
                observed_gap: millis(10),
            }
        );
        assert_eq!(entity.position, FloatVector::new(100.0, 100.0));
        assert_eq!(entity.last_acked_seq, NO_SEQUENCE);
        assert_eq!(entity.last_acked_at, T0 + millis(10));
    }

    #[test]
    fn test_accepts_elapsed_within_tolerance() {
        let mut entity = entity();

        let verdict = apply(&mut entity, &input(1, 0, right(), 15), 10);

        match verdict {
            InputVerdict::Applied { displacement } => {
                assert_approx_eq!(displacement.x, 4.5, 0.001);
                assert_eq!(displacement.y, 0.0);
            }
            other => panic!("Expected the input to be applied, got {:?}", other),
        }
        assert_approx_eq!(entity.position.x, 104.5, 0.001);
        assert_eq!(entity.last_acked_seq, 0);
        assert_eq!(entity.last_acked_at, T0 + millis(10));
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let mut entity = entity();
        let verdict = apply(&mut entity, &input(1, 0, right(), 18), 10);
        assert!(matches!(verdict, InputVerdict::Applied { .. }));
    }

    #[test]
    fn test_rejection_does_not_compound_tolerance() {
        let mut entity = entity();

        assert!(matches!(
            apply(&mut entity, &input(1, 0, right(), 50), 10),
            InputVerdict::Rejected { .. }
        ));
        // Measured from the rejected input (10ms gap), not from T0 (20ms gap).
        assert!(matches!(
            apply(&mut entity, &input(1, 1, right(), 25), 20),
            InputVerdict::Rejected { .. }
        ));
        assert!(matches!(
            apply(&mut entity, &input(1, 2, right(), 16), 30),
            InputVerdict::Applied { .. }
        ));
        assert_eq!(entity.last_acked_seq, 2);
    }

    #[test]
    fn test_plausible_elapsed_is_clamped_to_max_dt() {
        let mut entity = entity();

        let verdict = apply(&mut entity, &input(1, 0, right(), 100), 200);

        match verdict {
            InputVerdict::Applied { displacement } => {
                assert_approx_eq!(displacement.x, 15.0, 0.001);
            }
            other => panic!("Expected the input to be applied, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_never_regresses() {
        let mut entity = entity();

        for (i, sequence) in [5, 3, 7, 6].into_iter().enumerate() {
            let at = 20 * (i as u64 + 1);
            let verdict = apply(&mut entity, &input(1, sequence, right(), 16), at);
            assert!(matches!(verdict, InputVerdict::Applied { .. }));
        }

        assert_eq!(entity.last_acked_seq, 7);
        // All four moved the entity, including the late ones.
        assert_approx_eq!(entity.position.x, 100.0 + 4.0 * 4.8, 0.01);
    }

    #[test]
    fn test_position_stays_in_bounds() {
        let mut entity = Entity::spawn(1, FloatVector::new(5.0, 5.0), T0);
        apply(&mut entity, &input(1, 0, left(), 50), 100);
        assert_eq!(entity.position.x, 0.0);
    }

    struct Harness {
        engine: TickEngine,
        entities: Arc<EntityRegistry>,
        clients: Arc<ClientRegistry>,
        queue: Arc<MessageQueue>,
    }

    fn harness() -> Harness {
        let entities = Arc::new(EntityRegistry::new());
        let clients = Arc::new(ClientRegistry::new());
        let queue = Arc::new(MessageQueue::new());
        let engine = TickEngine::new(
            &ServerConfig::default(),
            Arc::clone(&entities),
            Arc::clone(&clients),
            Arc::clone(&queue),
        );
        Harness {
            engine,
            entities,
            clients,
            queue,
        }
    }

    fn connect(h: &Harness, id: u64) -> mpsc::Receiver<Outbound> {
        connect_with_capacity(h, id, 16)
    }

    fn connect_with_capacity(h: &Harness, id: u64, capacity: usize) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(capacity);
        h.entities
            .insert(id, Entity::spawn(id, SPAWN_POSITION, T0))
            .unwrap();
        h.clients
            .insert(
                id,
                ClientHandle::new(id, "127.0.0.1:9000".parse().unwrap(), tx),
            )
            .unwrap();
        rx
    }

    fn queued(
        player_id: u64,
        sequence: i64,
        keys: InputState,
        elapsed_ms: u64,
        at_ms: u64,
    ) -> Message {
        let mut message = Message::from(input(player_id, sequence, keys, elapsed_ms));
        message.set_received_at(T0 + millis(at_ms));
        message
    }

    fn received_snapshot(rx: &mut mpsc::Receiver<Outbound>) -> WorldSnapshot {
        let bytes = rx.try_recv().expect("no snapshot queued");
        match decode(&bytes).unwrap() {
            Message::WorldSnapshot(snapshot) => snapshot,
            other => panic!("Expected a snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_tick_applies_batch_and_broadcasts() {
        let mut h = harness();
        let mut rx1 = connect(&h, 1);
        let mut rx2 = connect(&h, 2);

        h.queue.push(queued(1, 0, right(), 16, 20));
        h.queue.push(queued(2, 0, left(), 16, 20));
        h.queue.push(queued(1, 1, right(), 16, 40));

        let report = h.engine.tick();
        assert_eq!(
            report,
            TickReport {
                applied: 3,
                rejected: 0,
                dropped: 0,
                recipients: 2,
                lagging: 0,
            }
        );
        assert!(h.queue.is_empty());
        assert_eq!(h.engine.tick_count(), 1);

        for rx in [&mut rx1, &mut rx2] {
            let snapshot = received_snapshot(rx);
            assert_eq!(snapshot.entities.len(), 2);

            let one = snapshot.entity(1).unwrap();
            assert_approx_eq!(one.position.x, 30.0 + 2.0 * 4.8, 0.01);
            assert_eq!(one.last_acked_seq, 1);

            let two = snapshot.entity(2).unwrap();
            assert_approx_eq!(two.position.x, 30.0 - 4.8, 0.01);
            assert_eq!(two.last_acked_seq, 0);
        }
    }

    #[test]
    fn test_tick_drops_input_for_departed_entity() {
        let mut h = harness();
        let mut rx = connect(&h, 1);

        h.queue.push(queued(9, 0, right(), 16, 20));
        let report = h.engine.tick();

        assert_eq!(report.dropped, 1);
        assert_eq!(report.applied, 0);
        assert_eq!(received_snapshot(&mut rx).entities.len(), 1);
    }

    #[test]
    fn test_tick_counts_rejections() {
        let mut h = harness();
        let _rx = connect(&h, 1);

        h.queue.push(queued(1, 0, right(), 50, 10));
        let report = h.engine.tick();

        assert_eq!(report.rejected, 1);
        let entity = h.entities.get(1).unwrap();
        assert_eq!(entity.position, SPAWN_POSITION);
        assert_eq!(entity.last_acked_seq, NO_SEQUENCE);
    }

    #[test]
    fn test_tick_ignores_non_input_messages() {
        let mut h = harness();
        h.queue.push(Message::from(AssignIdentity::new(5)));

        let report = h.engine.tick();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.recipients, 0);
    }

    #[test]
    fn test_broadcast_skips_closed_clients() {
        let mut h = harness();
        let mut open = connect(&h, 1);
        let closed = connect(&h, 2);
        drop(closed);

        let report = h.engine.tick();
        assert_eq!(report.recipients, 1);
        assert_eq!(received_snapshot(&mut open).entities.len(), 2);
    }

    #[test]
    fn test_stalled_client_queue_stays_bounded() {
        let mut h = harness();
        let mut stalled = connect_with_capacity(&h, 1, 4);
        let mut reading = connect_with_capacity(&h, 2, 4);

        let mut lagging = 0;
        for _ in 0..100 {
            let report = h.engine.tick();
            lagging += report.lagging;
            received_snapshot(&mut reading);
        }
        assert_eq!(lagging, 96);

        let mut backlog = 0;
        while stalled.try_recv().is_ok() {
            backlog += 1;
        }
        assert_eq!(backlog, 4);
        assert!(h.clients.contains(1));

        // Once drained, the slow client gets the next snapshot again.
        let report = h.engine.tick();
        assert_eq!(report.recipients, 2);
        assert_eq!(report.lagging, 0);
        assert!(received_snapshot(&mut stalled).entity(1).is_some());
    }

    #[test]
    fn test_snapshot_omits_removed_entities() {
        let h = harness();
        let _rx1 = connect(&h, 1);
        let _rx2 = connect(&h, 2);
        h.entities.remove(1);

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.entities.len(), 1);
        assert_eq!(snapshot.entities[0].id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paces_ticks() {
        let h = harness();
        let mut rx = connect(&h, 1);
        let handle = tokio::spawn(h.engine.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let mut snapshots = 0;
        while rx.try_recv().is_ok() {
            snapshots += 1;
        }
        // Ticks at 0, 33, 66 and 99ms.
        assert!((3..=5).contains(&snapshots), "got {} snapshots", snapshots);
    }
}
