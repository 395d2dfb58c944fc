//! Priority task queue driven by a fixed set of agents
//!
//! Waiting tasks are kept in descending priority order, ties in submission
//! order. Each [`TaskPool::update`] first advances the working agents, then
//! offers waiting tasks to free agents. An agent decides what starting a task
//! means through [`StartTaskStatus`]; a task that has to wait stays queued
//! with its identity intact and is offered again on the next pass.

use std::collections::VecDeque;
use std::time::Duration;

/// Outcome of offering a task to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTaskStatus {
    /// Finished immediately
    Done,
    /// Blocked for now; keep it queued
    HasToWait,
    /// Started; the agent keeps working on it
    CanResume,
    /// Failed to start; drop it
    UnknownError,
}

/// Unit of work queued in a [`TaskPool`]
pub trait Task {
    /// Unique identifier
    fn serial_id(&self) -> u64;

    /// Higher runs first
    fn priority(&self) -> i32;

    /// Whether the task has finished, successfully or not
    fn is_done(&self) -> bool;
}

/// Worker owning the state of one task in progress
pub trait TaskAgent<C> {
    /// Tasks this agent works on
    type Task: Task;

    /// Decide whether and how `task` can start
    fn start(&mut self, task: &mut Self::Task, context: &mut C) -> StartTaskStatus;

    /// Advance the task this agent is working on
    fn update(&mut self, task: &mut Self::Task, context: &mut C, elapsed: Duration);

    /// Drop per-task state before the agent is reused
    fn reset(&mut self, context: &mut C);
}

/// Tasks and the agents working on them
#[derive(Debug)]
pub struct TaskPool<G, T> {
    free: Vec<G>,
    working: Vec<(G, T)>,
    waiting: VecDeque<T>,
}

impl<G, T> Default for TaskPool<G, T> {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            working: Vec::new(),
            waiting: VecDeque::new(),
        }
    }
}

impl<G, T: Task> TaskPool<G, T> {
    /// Pool without agents
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an idle agent
    pub fn add_agent(&mut self, agent: G) {
        self.free.push(agent);
    }

    /// Number of agents
    pub fn total_agent_count(&self) -> usize {
        self.free.len() + self.working.len()
    }

    /// Number of idle agents
    pub fn free_agent_count(&self) -> usize {
        self.free.len()
    }

    /// Number of agents working on a task
    pub fn working_agent_count(&self) -> usize {
        self.working.len()
    }

    /// Number of queued tasks
    pub fn waiting_task_count(&self) -> usize {
        self.waiting.len()
    }

    /// Queued tasks in the order they will be offered
    pub fn waiting_tasks(&self) -> impl Iterator<Item = &T> {
        self.waiting.iter()
    }

    /// Queue `task` behind every task of equal or higher priority
    pub fn add_task(&mut self, task: T) {
        let position = self
            .waiting
            .iter()
            .position(|t| t.priority() < task.priority())
            .unwrap_or(self.waiting.len());
        self.waiting.insert(position, task);
    }

    /// Remove the task `serial_id`, resetting its agent if one is working on it
    pub fn remove_task<C>(&mut self, serial_id: u64, context: &mut C) -> Option<T>
    where
        G: TaskAgent<C, Task = T>,
    {
        if let Some(index) = self.waiting.iter().position(|t| t.serial_id() == serial_id) {
            return self.waiting.remove(index);
        }
        let index = self
            .working
            .iter()
            .position(|(_, t)| t.serial_id() == serial_id)?;
        let (mut agent, task) = self.working.remove(index);
        agent.reset(context);
        self.free.push(agent);
        Some(task)
    }

    /// Remove every task, resetting every working agent
    pub fn remove_all_tasks<C>(&mut self, context: &mut C) -> Vec<T>
    where
        G: TaskAgent<C, Task = T>,
    {
        let mut removed: Vec<T> = self.waiting.drain(..).collect();
        for (mut agent, task) in self.working.drain(..) {
            agent.reset(context);
            self.free.push(agent);
            removed.push(task);
        }
        removed
    }

    /// Advance working agents, then start waiting tasks on free agents
    pub fn update<C>(&mut self, context: &mut C, elapsed: Duration)
    where
        G: TaskAgent<C, Task = T>,
    {
        let mut index = 0;
        while index < self.working.len() {
            let (agent, task) = &mut self.working[index];
            if !task.is_done() {
                agent.update(task, context, elapsed);
            }
            if task.is_done() {
                let (mut agent, _) = self.working.remove(index);
                agent.reset(context);
                self.free.push(agent);
            } else {
                index += 1;
            }
        }

        let mut index = 0;
        while index < self.waiting.len() {
            let Some(mut agent) = self.free.pop() else {
                break;
            };
            let status = agent.start(&mut self.waiting[index], context);
            match status {
                StartTaskStatus::CanResume => {
                    if let Some(task) = self.waiting.remove(index) {
                        self.working.push((agent, task));
                    }
                }
                StartTaskStatus::HasToWait => {
                    agent.reset(context);
                    self.free.push(agent);
                    index += 1;
                }
                StartTaskStatus::Done | StartTaskStatus::UnknownError => {
                    agent.reset(context);
                    self.free.push(agent);
                    self.waiting.remove(index);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Job {
        id: u64,
        priority: i32,
        ticks: u32,
        done: bool,
    }

    impl Task for Job {
        fn serial_id(&self) -> u64 {
            self.id
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_done(&self) -> bool {
            self.done
        }
    }

    #[derive(Debug, Default)]
    struct Log {
        started: Vec<u64>,
        blocked: Vec<u64>,
        resets: usize,
    }

    /// Finishes a job after `ticks` updates; job 99 always waits
    struct Worker;

    impl TaskAgent<Log> for Worker {
        type Task = Job;

        fn start(&mut self, task: &mut Job, log: &mut Log) -> StartTaskStatus {
            if task.id == 99 {
                log.blocked.push(task.id);
                return StartTaskStatus::HasToWait;
            }
            log.started.push(task.id);
            if task.ticks == 0 {
                task.done = true;
                StartTaskStatus::Done
            } else {
                StartTaskStatus::CanResume
            }
        }

        fn update(&mut self, task: &mut Job, _log: &mut Log, _elapsed: Duration) {
            task.ticks -= 1;
            task.done = task.ticks == 0;
        }

        fn reset(&mut self, log: &mut Log) {
            log.resets += 1;
        }
    }

    fn job(id: u64, priority: i32, ticks: u32) -> Job {
        Job {
            id,
            priority,
            ticks,
            done: false,
        }
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let mut pool: TaskPool<Worker, Job> = TaskPool::new();
        pool.add_task(job(1, 0, 1));
        pool.add_task(job(2, 5, 1));
        pool.add_task(job(3, 0, 1));
        pool.add_task(job(4, 5, 1));
        let order: Vec<u64> = pool.waiting_tasks().map(|t| t.id).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_agents_bound_concurrency() {
        let mut pool = TaskPool::new();
        pool.add_agent(Worker);
        pool.add_agent(Worker);
        for id in 1..=3 {
            pool.add_task(job(id, 0, 1));
        }
        let mut log = Log::default();

        pool.update(&mut log, Duration::ZERO);
        assert_eq!(log.started, vec![1, 2]);
        assert_eq!(pool.working_agent_count(), 2);
        assert_eq!(pool.waiting_task_count(), 1);

        pool.update(&mut log, Duration::ZERO);
        assert_eq!(log.started, vec![1, 2, 3]);
        assert_eq!(pool.working_agent_count(), 1);

        pool.update(&mut log, Duration::ZERO);
        assert_eq!(pool.working_agent_count(), 0);
        assert_eq!(pool.free_agent_count(), 2);
        assert_eq!(log.resets, 3);
    }

    #[test]
    fn test_waiting_task_is_skipped_not_dropped() {
        let mut pool = TaskPool::new();
        pool.add_agent(Worker);
        pool.add_task(job(99, 1, 0));
        pool.add_task(job(7, 0, 0));
        let mut log = Log::default();

        pool.update(&mut log, Duration::ZERO);
        assert_eq!(log.blocked, vec![99]);
        assert_eq!(log.started, vec![7]);
        assert_eq!(pool.waiting_task_count(), 1);
        assert_eq!(pool.waiting_tasks().next().map(|t| t.id), Some(99));
    }

    #[test]
    fn test_remove_task_resets_working_agent() {
        let mut pool = TaskPool::new();
        pool.add_agent(Worker);
        pool.add_task(job(1, 0, 5));
        pool.add_task(job(2, 0, 5));
        let mut log = Log::default();
        pool.update(&mut log, Duration::ZERO);

        assert_eq!(pool.remove_task(2, &mut log).map(|t| t.id), Some(2));
        assert_eq!(pool.remove_task(1, &mut log).map(|t| t.id), Some(1));
        assert!(pool.remove_task(1, &mut log).is_none());
        assert_eq!(pool.free_agent_count(), 1);
        assert_eq!(log.resets, 1);
    }
}
