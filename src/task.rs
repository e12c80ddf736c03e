//! Task Records
//!
//! A task is bookkeeping only: a saved stack pointer, the physical address
//! of its top-level page table, a pid and a lifecycle state. There is no
//! scheduler and no context switch; the table just keeps the records
//! consistent.
//!
//! # Task Lifecycle
//! ```text
//! New ──▶ Ready ◀──▶ Running
//!           ▲           │
//!           └─ Blocked ◀┘
//!
//! any live state ──▶ Terminated ──reap──▶ (gone)
//! ```

use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;
use x86_64::{PhysAddr, VirtAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl TaskState {
    pub fn can_become(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (New, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Blocked)
                | (Blocked, Ready)
                | (New | Ready | Running | Blocked, Terminated)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NoSuchTask(Pid),
    InvalidTransition { from: TaskState, to: TaskState },
    PidsExhausted,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchTask(pid) => write!(f, "no task with pid {}", pid),
            Self::InvalidTransition { from, to } => {
                write!(f, "task cannot go from {:?} to {:?}", from, to)
            }
            Self::PidsExhausted => write!(f, "pid space exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub stack_pointer: VirtAddr,
    pub address_space: PhysAddr,
    pub pid: Pid,
    state: TaskState,
}

impl Task {
    pub fn new(pid: Pid, stack_pointer: VirtAddr, address_space: PhysAddr) -> Self {
        Self {
            stack_pointer,
            address_space,
            pid,
            state: TaskState::New,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn transition(&mut self, next: TaskState) -> Result<(), TaskError> {
        if !self.state.can_become(next) {
            return Err(TaskError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

pub struct TaskTable {
    tasks: Vec<Task>,
    next_pid: u32,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_pid: 1,
        }
    }

    /// Records a new task in state `New` and returns its pid.
    pub fn spawn(&mut self, stack_pointer: VirtAddr, address_space: PhysAddr) -> Result<Pid, TaskError> {
        let pid = Pid(self.next_pid);
        self.next_pid = self.next_pid.checked_add(1).ok_or(TaskError::PidsExhausted)?;
        self.tasks.push(Task::new(pid, stack_pointer, address_space));
        Ok(pid)
    }

    /// `New` to `Ready`.
    pub fn admit(&mut self, pid: Pid) -> Result<(), TaskError> {
        self.get_mut(pid)?.transition(TaskState::Ready)
    }

    /// Makes `pid` the running task. Whatever ran before goes back to `Ready`.
    pub fn set_running(&mut self, pid: Pid) -> Result<(), TaskError> {
        let state = self.get(pid).ok_or(TaskError::NoSuchTask(pid))?.state();
        if state == TaskState::Running {
            return Ok(());
        }
        if !state.can_become(TaskState::Running) {
            return Err(TaskError::InvalidTransition {
                from: state,
                to: TaskState::Running,
            });
        }

        if let Some(previous) = self.tasks.iter_mut().find(|t| t.state == TaskState::Running) {
            previous.transition(TaskState::Ready)?;
        }
        self.get_mut(pid)?.transition(TaskState::Running)
    }

    pub fn block(&mut self, pid: Pid) -> Result<(), TaskError> {
        self.get_mut(pid)?.transition(TaskState::Blocked)
    }

    pub fn wake(&mut self, pid: Pid) -> Result<(), TaskError> {
        self.get_mut(pid)?.transition(TaskState::Ready)
    }

    pub fn terminate(&mut self, pid: Pid) -> Result<(), TaskError> {
        self.get_mut(pid)?.transition(TaskState::Terminated)
    }

    /// Drops every terminated record and returns how many went.
    pub fn reap(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.state != TaskState::Terminated);
        before - self.tasks.len()
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.state == TaskState::Running)
    }

    pub fn get(&self, pid: Pid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.pid == pid)
    }

    fn get_mut(&mut self, pid: Pid) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|t| t.pid == pid)
            .ok_or(TaskError::NoSuchTask(pid))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

pub static TASKS: Mutex<TaskTable> = Mutex::new(TaskTable::new());
