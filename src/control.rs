//! Lock-free parameter messages from the control thread to a unit.
//!
//! A unit keeps the [`Inbox`] and drains it at the start of `process`; the control
//! thread keeps the [`Controller`].
//!
//! ```
//! use klangnetz::control;
//!
//! let (mut controller, mut inbox) = control::channel::<f32>(4);
//! controller.send(0.5).unwrap();
//! assert_eq!(inbox.drain().collect::<Vec<_>>(), vec![0.5]);
//! ```

use rtrb::{Consumer, Producer, RingBuffer};

/// Queue length used by the built-in units.
pub const DEFAULT_CAPACITY: usize = 64;

/// Create a bounded message queue.
pub fn channel<M: Send + 'static>(capacity: usize) -> (Controller<M>, Inbox<M>) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (Controller { producer }, Inbox { consumer })
}

/// Sending half, held by the control thread.
pub struct Controller<M> {
    producer: Producer<M>,
}

impl<M: Send + 'static> Controller<M> {
    /// Queue a message for the next round.
    ///
    /// Returns `Err(msg)` with the message if the queue is full.
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.producer.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    /// Free slots in the queue.
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// True once the receiving unit has been dropped.
    pub fn is_closed(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Receiving half, held by the unit.
pub struct Inbox<M> {
    consumer: Consumer<M>,
}

impl<M> Inbox<M> {
    /// All messages queued so far. Never blocks or allocates.
    pub fn drain(&mut self) -> impl Iterator<Item = M> + '_ {
        core::iter::from_fn(move || self.consumer.pop().ok())
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }
}
