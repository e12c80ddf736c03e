use core::fmt;

use spin::Mutex;

pub const MAX_COMPONENTS: usize = 16;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

/// Fixed-capacity registry; usable before the heap exists.
pub struct StatusTable {
    components: [Option<ComponentStatus>; MAX_COMPONENTS],
}

impl StatusTable {
    pub const fn new() -> Self {
        Self {
            components: [None; MAX_COMPONENTS],
        }
    }

    /// Returns `false` when the table is full. Registering a name twice
    /// keeps the first entry.
    pub fn register(&mut self, name: &'static str) -> bool {
        if self.get(name).is_some() {
            return true;
        }
        match self.components.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(ComponentStatus::new(name));
                true
            }
            None => false,
        }
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(component) = self.components.iter_mut().flatten().find(|c| c.name == name) {
            component.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentStatus> + '_ {
        self.components.iter().flatten().copied()
    }

    pub fn all_ready(&self) -> bool {
        let mut components = self.iter().peekable();
        components.peek().is_some() && components.all(|c| c.is_complete())
    }
}

static INIT_STATUS: Mutex<StatusTable> = Mutex::new(StatusTable::new());

/// Track kernel component initialization
pub fn register_component(name: &'static str) {
    if !INIT_STATUS.lock().register(name) {
        log::warn!("status table full, not tracking {}", name);
    }
}

pub fn update_component_status(name: &'static str, status: InitStatus) {
    INIT_STATUS.lock().update(name, status);
}

/// Logs one line per registered component, then whether boot finished.
pub fn report() {
    let table = INIT_STATUS.lock();
    for component in table.iter() {
        log::info!("{:<24} {}", component.name, component.status);
    }
    if table.all_ready() {
        log::info!("all {} components ready", table.iter().count());
    } else {
        log::warn!("some components did not finish initialization");
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
