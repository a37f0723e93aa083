//! Cooperative Scheduler
//!
//! A single-threaded executor for the cooperative execution model. Tasks are
//! futures polled on the calling thread; a task suspends by awaiting a
//! [`Sleep`] from the scheduler's [`TimerHandle`], which lets every other
//! ready task run while its timer is pending. When nothing is ready the
//! scheduler parks the thread until the earliest armed deadline.
//!
//! The ready queue is shared with wakers, so it lives behind an `Arc<Mutex>`
//! even though only one thread ever drains it. Timers are local to the
//! scheduler thread.

use crate::error::HarnessError;
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};
use std::time::{Duration, Instant};

type ReadyQueue = Arc<Mutex<VecDeque<usize>>>;
type Task<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    next_seq: u64,
}

/// Handle for creating timers on a [`CooperativeScheduler`].
///
/// Cloning is cheap; all clones share the scheduler's timer queue.
#[derive(Clone, Default)]
pub struct TimerHandle {
    queue: Rc<RefCell<TimerQueue>>,
}

impl TimerHandle {
    /// A future that completes once `duration` has elapsed from now
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(Instant::now() + duration)
    }

    /// A future that completes at `deadline`
    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep {
            deadline,
            timers: self.clone(),
            armed: false,
        }
    }

    fn arm(&self, deadline: Instant, waker: Waker) {
        let mut queue = self.queue.borrow_mut();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Reverse(TimerEntry {
            deadline,
            seq,
            waker,
        }));
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queue
            .borrow()
            .heap
            .peek()
            .map(|Reverse(entry)| entry.deadline)
    }

    /// Wake every timer due at `now`, in deadline order
    fn fire_due(&self, now: Instant) -> usize {
        let due: Vec<Waker> = {
            let mut queue = self.queue.borrow_mut();
            let mut due = Vec::new();
            while queue
                .heap
                .peek()
                .is_some_and(|Reverse(entry)| entry.deadline <= now)
            {
                if let Some(Reverse(entry)) = queue.heap.pop() {
                    due.push(entry.waker);
                }
            }
            due
        };
        let fired = due.len();
        for waker in due {
            waker.wake();
        }
        fired
    }
}

/// Future returned by [`TimerHandle::sleep`]
pub struct Sleep {
    deadline: Instant,
    timers: TimerHandle,
    armed: bool,
}

impl Sleep {
    /// Instant at which this sleep completes
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.armed {
            self.timers.arm(self.deadline, cx.waker().clone());
            self.armed = true;
        }
        Poll::Pending
    }
}

struct TaskWaker {
    index: usize,
    ready: ReadyQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(self.index);
    }
}

/// Outputs of a completed scheduler run
#[derive(Debug)]
pub struct SchedulerRun<T> {
    /// Task outputs, indexed by spawn order
    pub outputs: Vec<T>,
    /// Task indices in the order they completed
    pub completion_order: Vec<usize>,
}

/// Single-threaded cooperative task scheduler
pub struct CooperativeScheduler<'a, T> {
    tasks: Vec<Option<Task<'a, T>>>,
    outputs: Vec<Option<T>>,
    ready: ReadyQueue,
    timers: TimerHandle,
}

impl<'a, T> CooperativeScheduler<'a, T> {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            outputs: Vec::new(),
            ready: Arc::new(Mutex::new(VecDeque::new())),
            timers: TimerHandle::default(),
        }
    }

    /// Timer handle to hand to tasks
    pub fn timers(&self) -> TimerHandle {
        self.timers.clone()
    }

    /// Number of spawned tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task has been spawned
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue a task; returns its index in the eventual outputs
    pub fn spawn<F>(&mut self, task: F) -> usize
    where
        F: Future<Output = T> + 'a,
    {
        let index = self.tasks.len();
        self.tasks.push(Some(Box::pin(task)));
        self.outputs.push(None);
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(index);
        index
    }

    /// Drive every task to completion.
    ///
    /// Fails with `Stalled` if tasks remain pending with no armed timer
    /// left to wake them.
    pub fn run(mut self) -> Result<SchedulerRun<T>, HarnessError> {
        let mut pending = self.tasks.len();
        let mut completion_order = Vec::with_capacity(pending);

        while pending > 0 {
            let next = self
                .ready
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            let Some(index) = next else {
                let Some(deadline) = self.timers.next_deadline() else {
                    return Err(HarnessError::Stalled { pending });
                };
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                self.timers.fire_due(Instant::now());
                continue;
            };

            // Duplicate wakes may name a task that already finished.
            let Some(task) = self.tasks[index].as_mut() else {
                continue;
            };

            let waker = Waker::from(Arc::new(TaskWaker {
                index,
                ready: Arc::clone(&self.ready),
            }));
            let mut cx = Context::from_waker(&waker);

            if let Poll::Ready(output) = task.as_mut().poll(&mut cx) {
                self.tasks[index] = None;
                self.outputs[index] = Some(output);
                completion_order.push(index);
                pending -= 1;
            }
        }

        Ok(SchedulerRun {
            outputs: self.outputs.into_iter().flatten().collect(),
            completion_order,
        })
    }
}

impl<T> Default for CooperativeScheduler<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}
