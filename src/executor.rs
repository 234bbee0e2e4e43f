//! # NUMA Executor
//!
//! A fixed pool of `nodes × threads_per_node` workers. Each node has its own
//! [`WorkerGroup`]: a FIFO task queue behind a mutex, a condition variable,
//! and a stop flag. Workers bind themselves to their node before entering
//! the task loop (best-effort; a failed bind is logged and the worker runs
//! unbound).
//!
//! ## Submission
//!
//! `submit(node, f)` wraps `f` in a one-shot [`TaskHandle`] future. Tasks
//! are never dropped:
//!
//! - executor not running → the task runs inline on the caller's thread and
//!   the handle comes back ready;
//! - executor stopping → workers drain their queues before exiting, and a
//!   submit that races past the stop flag runs inline.
//!
//! Node indices out of range are clamped by modulo, mirroring the page
//! router.
//!
//! ## Shutdown
//!
//! `stop` flips every group's stop flag, wakes all workers, joins every
//! thread, and clears the groups. Workers finish the task they are running
//! and whatever is left in their queue; shutdown is cooperative.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::warn;

use crate::numa::bind_current_thread;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct GroupState {
    tasks: VecDeque<Task>,
    stop: bool,
}

struct WorkerGroup {
    node: usize,
    state: Mutex<GroupState>,
    cv: Condvar,
}

struct TaskSlot<R> {
    result: Mutex<Option<R>>,
    cv: Condvar,
}

impl<R> TaskSlot<R> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, value: R) {
        let mut result = self.result.lock();
        *result = Some(value);
        self.cv.notify_all();
    }
}

/// One-shot future for a submitted task.
pub struct TaskHandle<R> {
    slot: Arc<TaskSlot<R>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run and returns its result.
    pub fn wait(self) -> R {
        let mut result = self.slot.result.lock();
        loop {
            if let Some(value) = result.take() {
                return value;
            }
            self.slot.cv.wait(&mut result);
        }
    }
}

pub struct NumaExecutor {
    nodes: usize,
    threads_per_node: usize,
    groups: RwLock<Vec<Arc<WorkerGroup>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl NumaExecutor {
    pub fn new(nodes: usize, threads_per_node: usize) -> Self {
        Self {
            nodes: nodes.max(1),
            threads_per_node: threads_per_node.max(1),
            groups: RwLock::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the worker threads. Idempotent while running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut groups = self.groups.write();
        let mut threads = self.threads.lock();
        groups.clear();

        for node in 0..self.nodes {
            let group = Arc::new(WorkerGroup {
                node,
                state: Mutex::new(GroupState {
                    tasks: VecDeque::new(),
                    stop: false,
                }),
                cv: Condvar::new(),
            });
            for _ in 0..self.threads_per_node {
                let group = Arc::clone(&group);
                let node_count = self.nodes;
                threads.push(std::thread::spawn(move || worker_loop(group, node_count)));
            }
            groups.push(group);
        }
    }

    /// Stops all workers, draining queued tasks first, and joins them.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let groups = self.groups.read();
            for group in groups.iter() {
                group.state.lock().stop = true;
                group.cv.notify_all();
            }
        }
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.groups.write().clear();
    }

    /// Queues `f` on `node`'s worker group and returns a future for its
    /// result. Runs inline when the executor is not running.
    pub fn submit<R, F>(&self, node: usize, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = Arc::new(TaskSlot::new());
        let task_slot = Arc::clone(&slot);
        let task: Task = Box::new(move || task_slot.set(f()));

        if !self.running.load(Ordering::Acquire) {
            task();
            return TaskHandle { slot };
        }

        let groups = self.groups.read();
        let Some(group) = groups.get(node % groups.len().max(1)) else {
            drop(groups);
            task();
            return TaskHandle { slot };
        };

        let mut state = group.state.lock();
        if state.stop {
            drop(state);
            drop(groups);
            task();
            return TaskHandle { slot };
        }
        state.tasks.push_back(task);
        drop(state);
        group.cv.notify_one();
        TaskHandle { slot }
    }
}

impl Drop for NumaExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(group: Arc<WorkerGroup>, node_count: usize) {
    if let Err(e) = bind_current_thread(group.node, node_count) {
        warn!(node = group.node, error = %e, "NUMA binding failed, worker runs unbound");
    }
    loop {
        let task = {
            let mut state = group.state.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    break task;
                }
                if state.stop {
                    return;
                }
                group.cv.wait(&mut state);
            }
        };
        task();
    }
}
