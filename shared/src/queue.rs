//! FIFO of decoded messages shared between reader tasks and a single consumer.

use crate::protocol::Message;
use parking_lot::Mutex;

/// Many producers push, one consumer takes everything at once with [`MessageQueue::pop_all`].
///
/// The lock is only held to append or to swap the buffer out, never across I/O.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: Mutex<Vec<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: Message) {
        self.messages.lock().push(message);
    }

    /// Removes and returns every queued message in arrival order.
    ///
    /// Messages pushed while the batch is being processed land in the next batch.
    pub fn pop_all(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AssignIdentity, ClientInput};
    use crate::InputState;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn input(player_id: u64, sequence: i64) -> Message {
        Message::from(ClientInput::new(
            player_id,
            sequence,
            InputState::default(),
            Duration::ZERO,
        ))
    }

    #[test]
    fn test_pop_all_returns_arrival_order() {
        let queue = MessageQueue::new();
        queue.push(input(1, 0));
        queue.push(Message::from(AssignIdentity::new(9)));
        queue.push(input(1, 1));
        assert_eq!(queue.len(), 3);

        let batch = queue.pop_all();
        assert_eq!(batch.len(), 3);
        assert!(matches!(&batch[0], Message::ClientInput(m) if m.sequence == 0));
        assert!(matches!(&batch[1], Message::AssignIdentity(m) if m.player_id == 9));
        assert!(matches!(&batch[2], Message::ClientInput(m) if m.sequence == 1));

        assert!(queue.is_empty());
        assert!(queue.pop_all().is_empty());
    }

    #[test]
    fn test_push_after_pop_goes_to_next_batch() {
        let queue = MessageQueue::new();
        queue.push(input(1, 0));
        let first = queue.pop_all();
        queue.push(input(1, 1));
        let second = queue.pop_all();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], Message::ClientInput(m) if m.sequence == 1));
    }

    #[test]
    fn test_concurrent_push_and_drain() {
        const PRODUCERS: u64 = 8;
        const PER_PRODUCER: i64 = 2_000;

        let queue = Arc::new(MessageQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let drainer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    seen.extend(queue.pop_all());
                    if finished {
                        seen.extend(queue.pop_all());
                        return seen;
                    }
                    thread::yield_now();
                }
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for sequence in 0..PER_PRODUCER {
                        queue.push(input(producer, sequence));
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let seen = drainer.join().unwrap();

        assert_eq!(seen.len() as i64, PRODUCERS as i64 * PER_PRODUCER);

        let mut unique = HashSet::new();
        let mut last_per_producer = vec![-1i64; PRODUCERS as usize];
        for message in &seen {
            match message {
                Message::ClientInput(m) => {
                    assert!(unique.insert((m.player_id, m.sequence)), "duplicate message");
                    // A single producer's messages keep their push order.
                    let last = &mut last_per_producer[m.player_id as usize];
                    assert!(m.sequence > *last);
                    *last = m.sequence;
                }
                other => panic!("Unexpected message: {:?}", other),
            }
        }
        assert!(queue.is_empty());
    }
}
