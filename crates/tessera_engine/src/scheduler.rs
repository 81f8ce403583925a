//! Per-frame system scheduling.
//!
//! Systems are grouped into phases that run in a fixed order. Within a
//! phase, `before`/`after` constraints are resolved by a topological sort
//! that keeps declaration order among systems free to run.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use futures::future::LocalBoxFuture;

use tessera_foundation::{Error, ErrorKind, Name, Result};

/// Phases used by [`SystemScheduler::new`], in run order.
pub const DEFAULT_PHASES: [&str; 10] = [
    "input",
    "preUpdate",
    "update",
    "prePhysics",
    "physics",
    "postPhysics",
    "postUpdate",
    "preRender",
    "render",
    "postRender",
];

/// A synchronous system body.
pub type SyncSystemFn = Box<dyn FnMut() -> Result<()>>;

/// An asynchronous system body.
pub type AsyncSystemFn = Box<dyn FnMut() -> LocalBoxFuture<'static, Result<()>>>;

/// How a system runs.
pub enum SystemRun {
    /// Runs to completion when called.
    Sync(SyncSystemFn),
    /// Returns a future the scheduler awaits before the next system starts.
    Async(AsyncSystemFn),
}

impl SystemRun {
    /// Wraps a synchronous body.
    pub fn sync(f: impl FnMut() -> Result<()> + 'static) -> Self {
        Self::Sync(Box::new(f))
    }

    /// Wraps an asynchronous body.
    pub fn future(f: impl FnMut() -> LocalBoxFuture<'static, Result<()>> + 'static) -> Self {
        Self::Async(Box::new(f))
    }
}

impl fmt::Debug for SystemRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Sync"),
            Self::Async(_) => f.write_str("Async"),
        }
    }
}

/// A named unit of per-frame work.
#[derive(Debug)]
pub struct System {
    name: Name,
    phase: Name,
    before: Vec<Name>,
    after: Vec<Name>,
    run: SystemRun,
}

impl System {
    /// Creates a system in `phase`.
    pub fn new(name: impl Into<Name>, phase: impl Into<Name>, run: SystemRun) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            before: Vec::new(),
            after: Vec::new(),
            run,
        }
    }

    /// Builder method: this system runs before each of `names`.
    #[must_use]
    pub fn before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.before.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder method: this system runs after each of `names`.
    #[must_use]
    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    /// The system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The phase it runs in.
    #[must_use]
    pub fn phase(&self) -> &str {
        &self.phase
    }

    async fn execute(&mut self) -> Result<()> {
        let outcome = match &mut self.run {
            SystemRun::Sync(f) => f(),
            SystemRun::Async(f) => f().await,
        };
        outcome.map_err(|err| {
            Error::new(ErrorKind::SystemFailed {
                system: self.name.to_string(),
                message: err.to_string(),
            })
        })
    }
}

#[derive(Debug)]
struct Phase {
    name: Name,
    systems: Vec<System>,
}

/// Systems sorted into phases, ready to run.
#[derive(Debug)]
pub struct SystemScheduler {
    phases: Vec<Phase>,
}

impl SystemScheduler {
    /// Builds a scheduler over [`DEFAULT_PHASES`].
    ///
    /// # Errors
    ///
    /// See [`Self::with_phases`].
    pub fn new(systems: impl IntoIterator<Item = System>) -> Result<Self> {
        Self::with_phases(DEFAULT_PHASES, systems)
    }

    /// Builds a scheduler over caller-supplied phases.
    ///
    /// Constraints naming a system in another phase, or no system at all,
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPhase` for a system outside `phases`,
    /// `DuplicateSystem` if two systems share a name and `CyclicSystemOrder`
    /// if a phase's constraints cannot be satisfied.
    pub fn with_phases<P, S>(phases: P, systems: impl IntoIterator<Item = System>) -> Result<Self>
    where
        P: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        let mut grouped: Vec<(Name, Vec<System>)> =
            phases.into_iter().map(|p| (p.into(), Vec::new())).collect();
        let mut seen: BTreeSet<Name> = BTreeSet::new();
        for system in systems {
            if !seen.insert(Name::clone(&system.name)) {
                return Err(Error::new(ErrorKind::DuplicateSystem(system.name.to_string())));
            }
            let (_, members) = grouped
                .iter_mut()
                .find(|(p, _)| *p == system.phase)
                .ok_or_else(|| Error::new(ErrorKind::UnknownPhase(system.phase.to_string())))?;
            members.push(system);
        }

        let phases = grouped
            .into_iter()
            .map(|(name, systems)| {
                let systems = sort_phase(&name, systems)?;
                Ok(Phase { name, systems })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            phases = phases.len(),
            systems = phases.iter().map(|p| p.systems.len()).sum::<usize>(),
            "system scheduler built"
        );
        Ok(Self { phases })
    }

    /// Phase names in run order.
    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| &*p.name)
    }

    /// Sorted system names of a phase, or `None` for an unknown phase.
    #[must_use]
    pub fn order(&self, phase: &str) -> Option<Vec<&str>> {
        self.phases
            .iter()
            .find(|p| &*p.name == phase)
            .map(|p| p.systems.iter().map(System::name).collect())
    }

    /// Runs every system of the selected phases, or of all phases.
    ///
    /// Phases run in declared order and systems one at a time in sorted
    /// order. The first failing system stops the run.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPhase` if the selection names an unknown phase, and
    /// `SystemFailed` for a failing system.
    pub async fn run(&mut self, phases: Option<&[&str]>) -> Result<()> {
        if let Some(selected) = phases {
            if let Some(unknown) = selected.iter().find(|s| !self.phases.iter().any(|p| &*p.name == **s)) {
                return Err(Error::new(ErrorKind::UnknownPhase((*unknown).to_string())));
            }
        }
        for phase in &mut self.phases {
            if phases.is_some_and(|selected| !selected.contains(&&*phase.name)) {
                continue;
            }
            for system in &mut phase.systems {
                system.execute().await?;
            }
        }
        Ok(())
    }
}

/// Orders one phase's systems.
///
/// Repeatedly takes the earliest-declared system with no unscheduled
/// predecessor.
fn sort_phase(phase: &str, systems: Vec<System>) -> Result<Vec<System>> {
    let index: HashMap<&str, usize> = systems.iter().enumerate().map(|(i, s)| (s.name(), i)).collect();
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); systems.len()];
    for (i, system) in systems.iter().enumerate() {
        let edges = system
            .before
            .iter()
            .map(|target| (target, true))
            .chain(system.after.iter().map(|target| (target, false)));
        for (target, before) in edges {
            let Some(&j) = index.get(&**target) else {
                tracing::debug!(system = %system.name, %target, phase, "ordering constraint outside phase ignored");
                continue;
            };
            if before {
                successors[i].insert(j);
            } else {
                successors[j].insert(i);
            }
        }
    }

    let mut indegree = vec![0usize; systems.len()];
    for &j in successors.iter().flatten() {
        indegree[j] += 1;
    }
    let mut ready: BTreeSet<usize> = (0..systems.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(systems.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < systems.len() {
        let cyclic = systems
            .iter()
            .enumerate()
            .filter(|&(i, _)| indegree[i] > 0)
            .map(|(_, s)| s.name.to_string())
            .collect();
        return Err(Error::new(ErrorKind::CyclicSystemOrder {
            phase: phase.to_string(),
            systems: cyclic,
        }));
    }

    let mut slots: Vec<Option<System>> = systems.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
