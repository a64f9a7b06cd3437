//! Background work outside the graph lock.
//!
//! A [`WorkPerformer`] owns two thread pools: a high-priority one for work the
//! audio side is waiting on (e.g. regenerating a wavetable after a parameter
//! change) and a low-priority one for everything else. Low-priority workers take
//! any pending high-priority job before their own next job, so urgent work never
//! waits behind a busy high pool while low threads are free. OS thread priorities
//! are left alone. Jobs never touch live port buffers; their results travel back
//! through a [`WorkTicket`] or an [`Exchange`].

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvError, Sender, TryRecvError};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::WorkerSettings;
use crate::error::WorkerError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Which pool a job runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Low,
}

/// A fixed set of named threads pulling jobs from one queue.
pub struct WorkPool {
    name: String,
    jobs: Option<Sender<Job>>,
    queue: Receiver<Job>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkPool {
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self, WorkerError> {
        Self::spawn(name.into(), threads, None)
    }

    /// A pool whose threads serve `urgent` first whenever it has jobs waiting.
    fn yielding_to(
        name: impl Into<String>,
        threads: usize,
        urgent: &WorkPool,
    ) -> Result<Self, WorkerError> {
        Self::spawn(name.into(), threads, Some(urgent.queue.clone()))
    }

    fn spawn(
        name: String,
        threads: usize,
        urgent: Option<Receiver<Job>>,
    ) -> Result<Self, WorkerError> {
        let (tx, rx) = unbounded::<Job>();
        let mut pool = Self {
            name,
            jobs: Some(tx),
            queue: rx,
            threads: Vec::with_capacity(threads),
        };
        for index in 0..threads.max(1) {
            let thread_name = format!("{}-{index}", pool.name);
            let rx = pool.queue.clone();
            let urgent = urgent.clone();
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(rx, urgent))
                .map_err(|source| WorkerError::Spawn {
                    name: thread_name,
                    source,
                })?;
            pool.threads.push(handle);
        }
        tracing::debug!(pool = %pool.name, threads = pool.threads.len(), "worker pool started");
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Queue a job; its result is delivered through the returned ticket.
    pub fn submit<T, F>(&self, job: F) -> Result<WorkTicket<T>, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| WorkerError::PoolClosed(self.name.clone()))?;
        let (tx, rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let wrapped: Job = Box::new(move || {
            if flag.load(Ordering::Acquire) {
                return;
            }
            let _ = tx.send(job());
        });
        jobs.send(wrapped)
            .map_err(|_| WorkerError::PoolClosed(self.name.clone()))?;
        Ok(WorkTicket {
            result: rx,
            cancelled,
            pool: self.name.clone(),
        })
    }

    /// Stop accepting jobs, finish the queued ones and join every thread.
    pub fn shutdown(&mut self) {
        if self.jobs.take().is_none() {
            return;
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!(pool = %self.name, "worker thread panicked");
            }
        }
        tracing::debug!(pool = %self.name, "worker pool stopped");
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<Job>, mut urgent: Option<Receiver<Job>>) {
    loop {
        if let Some(queue) = &urgent {
            match queue.try_recv() {
                Ok(job) => {
                    job();
                    continue;
                }
                Err(TryRecvError::Disconnected) => urgent = None,
                Err(TryRecvError::Empty) => {}
            }
        }
        let job = match &urgent {
            Some(queue) => select! {
                recv(queue) -> job => job.ok(),
                recv(jobs) -> job => match job {
                    Ok(job) => Some(job),
                    Err(_) => return,
                },
            },
            None => match jobs.recv() {
                Ok(job) => Some(job),
                Err(_) => return,
            },
        };
        if let Some(job) = job {
            job();
        }
    }
}

/// Pending result of a submitted job.
pub struct WorkTicket<T> {
    result: Receiver<T>,
    cancelled: Arc<AtomicBool>,
    pool: String,
}

impl<T> WorkTicket<T> {
    /// Block until the job finishes.
    ///
    /// Fails if the job was cancelled before it started, panicked, or its pool shut
    /// down without running it.
    pub fn wait(self) -> Result<T, WorkerError> {
        self.result.recv().map_err(|RecvError| {
            if self.is_cancelled() {
                WorkerError::Cancelled
            } else {
                WorkerError::PoolClosed(self.pool.clone())
            }
        })
    }

    /// The result, if the job has finished.
    pub fn try_get(&self) -> Option<T> {
        match self.result.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Skip the job if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// High- and low-priority worker pools.
pub struct WorkPerformer {
    high: WorkPool,
    low: WorkPool,
}

impl WorkPerformer {
    pub fn new(settings: &WorkerSettings) -> Result<Self, WorkerError> {
        let high = WorkPool::new("klangnetz-hi", settings.high_priority)?;
        let low = WorkPool::yielding_to("klangnetz-lo", settings.low_priority, &high)?;
        Ok(Self { high, low })
    }

    pub fn pool(&self, priority: Priority) -> &WorkPool {
        match priority {
            Priority::High => &self.high,
            Priority::Low => &self.low,
        }
    }

    pub fn submit<T, F>(&self, priority: Priority, job: F) -> Result<WorkTicket<T>, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.pool(priority).submit(job)
    }

    pub fn shutdown(&mut self) {
        self.high.shutdown();
        self.low.shutdown();
    }
}

/// Real-time side of a value hand-off.
///
/// The control or worker side publishes new values through a [`Publisher`]; the
/// audio thread picks them up with [`update`](Self::update) without allocating or
/// freeing. Replaced values travel back to the publisher, which drops them.
pub struct Exchange<T> {
    current: T,
    incoming: Consumer<T>,
    retired: Producer<T>,
}

/// Control side of an [`Exchange`].
pub struct Publisher<T> {
    outgoing: Producer<T>,
    retired: Consumer<T>,
}

impl<T: Send + 'static> Exchange<T> {
    /// Create a hand-off holding `initial`, with room for `capacity` values in
    /// flight each way.
    pub fn new(initial: T, capacity: usize) -> (Publisher<T>, Exchange<T>) {
        let capacity = capacity.max(1);
        let (outgoing, incoming) = RingBuffer::new(capacity);
        let (retired_tx, retired_rx) = RingBuffer::new(capacity);
        (
            Publisher {
                outgoing,
                retired: retired_rx,
            },
            Exchange {
                current: initial,
                incoming,
                retired: retired_tx,
            },
        )
    }

    /// Swap in published values, newest last. Returns `true` if the current value
    /// changed. A value stays queued while the return path is full.
    pub fn update(&mut self) -> bool {
        let mut changed = false;
        while !self.retired.is_full() {
            let Ok(next) = self.incoming.pop() else {
                break;
            };
            let old = core::mem::replace(&mut self.current, next);
            // Cannot fail: checked for a free slot above.
            let _ = self.retired.push(old);
            changed = true;
        }
        changed
    }

    #[inline]
    pub fn get(&self) -> &T {
        &self.current
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.current
    }
}

impl<T: Send + 'static> Publisher<T> {
    /// Queue a new value. Returns it back if too many are in flight.
    pub fn publish(&mut self, value: T) -> Result<(), T> {
        self.reclaim();
        self.outgoing.push(value).map_err(|rtrb::PushError::Full(v)| v)
    }

    /// Drop values the real-time side has replaced. Returns how many.
    pub fn reclaim(&mut self) -> usize {
        let mut count = 0;
        while let Ok(old) = self.retired.pop() {
            drop(old);
            count += 1;
        }
        count
    }

    /// True once the real-time side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_abandoned()
    }
}
