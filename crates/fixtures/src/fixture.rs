//! Fixture kinds and the per-suite wanted set.
//!
//! The menu of fixtures is closed: [`Fixture::ALL`] lists every kind in
//! provisioning order, and teardown walks the same list in reverse.

use std::fmt;

/// A piece of test-environment state provisioned around each test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fixture {
    /// `scratch` directory under the suite temp root, fresh for every test
    ScratchStorage,
    /// Background scheduler server process, started and stopped per test
    SchedulerServer,
    /// Registry mock; provisioned by test code through `oasis-registry-mock`
    Registry,
}

impl Fixture {
    /// Every fixture kind, in provisioning order.
    pub const ALL: [Fixture; 3] = [
        Fixture::ScratchStorage,
        Fixture::SchedulerServer,
        Fixture::Registry,
    ];

    /// Stable name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScratchStorage => "scratch-storage",
            Self::SchedulerServer => "background-scheduler-server",
            Self::Registry => "registry",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixtures a suite wants. Fixed at suite construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureSet {
    wanted: [bool; Fixture::ALL.len()],
}

impl FixtureSet {
    /// A set wanting no fixtures at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if the suite wants `fixture`.
    pub fn wants(&self, fixture: Fixture) -> bool {
        self.wanted[fixture.index()]
    }

    /// Returns `true` if no fixture is wanted.
    pub fn is_empty(&self) -> bool {
        !self.wanted.contains(&true)
    }

    /// Wanted fixtures in provisioning order.
    pub fn iter(&self) -> impl Iterator<Item = Fixture> + '_ {
        Fixture::ALL.into_iter().filter(|f| self.wants(*f))
    }

    /// Wanted fixtures in teardown order (reverse of provisioning).
    pub fn iter_teardown(&self) -> impl Iterator<Item = Fixture> + '_ {
        Fixture::ALL.into_iter().rev().filter(|f| self.wants(*f))
    }
}

impl FromIterator<Fixture> for FixtureSet {
    fn from_iter<I: IntoIterator<Item = Fixture>>(iter: I) -> Self {
        let mut set = Self::none();
        for fixture in iter {
            set.wanted[fixture.index()] = true;
        }
        set
    }
}

impl fmt::Display for FixtureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Fixture::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
