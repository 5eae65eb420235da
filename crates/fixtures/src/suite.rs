//! Per-suite fixture lifecycle.
//!
//! ```text
//! Uninitialized ──setup_suite──▶ SuiteReady ──setup_test──▶ TestReady
//!                                  │   ▲                      │
//!                                  │   └────teardown_test─────┘
//!                                  └──teardown_suite──▶ Terminated
//! ```
//!
//! Every wanted fixture gets one provisioning step and one release step.
//! Setup walks [`FixtureSet::iter`], teardown walks
//! [`FixtureSet::iter_teardown`]. Release steps are independent: one
//! failing does not stop the others, and all failures are reported
//! together.
//!
//! # Example
//!
//! ```no_run
//! use oasis_core::TestkitConfig;
//! use oasis_fixtures::{Fixture, Suite};
//!
//! # async fn example() {
//! let mut suite = Suite::setup(
//!     [Fixture::ScratchStorage, Fixture::SchedulerServer],
//!     TestkitConfig::default(),
//! )
//! .await
//! .unwrap();
//!
//! suite
//!     .run_test("deploy_from_scratch", |ctx| async move {
//!         let out = ctx.cli().run(["job", "run", "example.hcl"]).await.unwrap();
//!         assert!(out.success());
//!     })
//!     .await;
//!
//! suite.teardown_suite().await.unwrap();
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use oasis_core::TestkitConfig;
use oasis_core::metrics as m;

use crate::error::HarnessError;
use crate::executable::{BackgroundRun, Executable};
use crate::fixture::{Fixture, FixtureSet};
use crate::scratch::{create_scratch_dir, remove_scratch_dir};

/// Subdirectory of the temp root used as the scheduler data dir.
const SCHEDULER_DATA_DIR: &str = "scheduler";

static DESCRIBE_METRICS: Once = Once::new();

/// Lifecycle state of a [`Suite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    /// Constructed, suite setup not run yet
    Uninitialized,
    /// Suite resources allocated, no test active
    SuiteReady,
    /// A test is active
    TestReady,
    /// Suite torn down; terminal
    Terminated,
}

impl fmt::Display for SuiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::SuiteReady => write!(f, "suite-ready"),
            Self::TestReady => write!(f, "test-ready"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// What a test body gets to work with.
#[derive(Debug, Clone)]
pub struct TestContext {
    name: String,
    suite_id: Uuid,
    scratch: Option<PathBuf>,
    cli: Executable,
    cancel: CancellationToken,
}

impl TestContext {
    /// Test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the owning suite.
    pub fn suite_id(&self) -> Uuid {
        self.suite_id
    }

    /// Scratch directory, if scratch storage is wanted.
    pub fn scratch(&self) -> Option<&Path> {
        self.scratch.as_deref()
    }

    /// Joins `parts` onto the scratch directory.
    pub fn scratch_path<I, P>(&self, parts: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.scratch.as_deref().map(|dir| join_parts(dir, parts))
    }

    /// Orchestration CLI, running in the scratch directory when there is one.
    pub fn cli(&self) -> &Executable {
        &self.cli
    }

    /// Suite lifetime token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A test suite and the fixtures it provisions around each test.
pub struct Suite {
    id: Uuid,
    fixtures: FixtureSet,
    config: TestkitConfig,
    state: SuiteState,
    temp_root: Option<TempDir>,
    cancel: Option<CancellationToken>,
    cli: Option<Executable>,
    scheduler: Option<Executable>,
    scheduler_run: Option<BackgroundRun>,
    current_test: Option<String>,
}

impl Suite {
    /// Creates an uninitialized suite. The wanted set is fixed from here on.
    pub fn new(fixtures: impl IntoIterator<Item = Fixture>, config: TestkitConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            fixtures: fixtures.into_iter().collect(),
            config,
            state: SuiteState::Uninitialized,
            temp_root: None,
            cancel: None,
            cli: None,
            scheduler: None,
            scheduler_run: None,
            current_test: None,
        }
    }

    /// [`new`](Self::new) followed by [`setup_suite`](Self::setup_suite).
    pub async fn setup(
        fixtures: impl IntoIterator<Item = Fixture>,
        config: TestkitConfig,
    ) -> Result<Self, HarnessError> {
        let mut suite = Self::new(fixtures, config);
        suite.setup_suite().await?;
        Ok(suite)
    }

    /// Allocates the temp root and builds the executable handles.
    ///
    /// The scheduler handle is only built, not started.
    pub async fn setup_suite(&mut self) -> Result<(), HarnessError> {
        self.expect_state(SuiteState::Uninitialized, "set up suite")?;
        self.config
            .validate()
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        DESCRIBE_METRICS.call_once(m::describe_all);

        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.config.suite.temp_prefix);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o700));
        }
        let temp_root = builder
            .tempdir()
            .map_err(|e| HarnessError::Filesystem {
                op: "create",
                path: std::env::temp_dir().display().to_string(),
                reason: e.to_string(),
            })?;

        if self.fixtures.wants(Fixture::SchedulerServer) {
            let data_dir = temp_root.path().join(SCHEDULER_DATA_DIR);
            create_scratch_dir(&data_dir).await?;
            let scheduler = Executable::for_scheduler(&self.config.scheduler, &data_dir)?;
            info!(
                suite = %self.id,
                binary = %self.config.scheduler.binary,
                version = %self.config.scheduler.version,
                "scheduler handle prepared"
            );
            self.scheduler = Some(scheduler);
        }

        self.cli = Some(Executable::for_cli(&self.config.cli));
        self.cancel = Some(CancellationToken::new());

        info!(
            suite = %self.id,
            fixtures = %self.fixtures,
            temp_root = %temp_root.path().display(),
            "suite set up"
        );
        self.temp_root = Some(temp_root);
        self.state = SuiteState::SuiteReady;
        Ok(())
    }

    /// Provisions every wanted fixture for the test `name`.
    ///
    /// On failure the fixtures already provisioned are released again and
    /// the suite stays in [`SuiteState::SuiteReady`].
    pub async fn setup_test(&mut self, name: &str) -> Result<TestContext, HarnessError> {
        self.expect_state(SuiteState::SuiteReady, "set up test")?;

        let fixtures = self.fixtures;
        for fixture in fixtures.iter() {
            let result = self.provision(fixture).await;
            record(m::FIXTURE_SETUPS_TOTAL, fixture, result.is_ok());
            if let Err(e) = result {
                error!(suite = %self.id, test = name, %fixture, error = %e, "fixture setup failed");
                if let Err(rollback) = self.release_all().await {
                    warn!(suite = %self.id, test = name, error = %rollback, "rollback after failed setup");
                }
                return Err(e);
            }
        }

        let scratch = if self.fixtures.wants(Fixture::ScratchStorage) {
            Some(self.scratch_dir()?)
        } else {
            None
        };
        let mut cli = self.cli()?.clone();
        if let Some(dir) = &scratch {
            cli = cli.current_dir(dir);
        }

        self.current_test = Some(name.to_owned());
        self.state = SuiteState::TestReady;
        debug!(suite = %self.id, test = name, "test set up");

        Ok(TestContext {
            name: name.to_owned(),
            suite_id: self.id,
            scratch,
            cli,
            cancel: self.cancel_token()?.clone(),
        })
    }

    /// Releases every wanted fixture of the active test.
    ///
    /// The background run is stopped before the scratch directory is
    /// removed. Both always run; the suite returns to
    /// [`SuiteState::SuiteReady`] even when a step fails.
    pub async fn teardown_test(&mut self) -> Result<(), HarnessError> {
        self.expect_state(SuiteState::TestReady, "tear down test")?;

        let result = self.release_all().await;
        let test = self.current_test.take().unwrap_or_default();
        self.state = SuiteState::SuiteReady;

        match &result {
            Ok(()) => debug!(suite = %self.id, test = %test, "test torn down"),
            Err(e) => error!(suite = %self.id, test = %test, error = %e, "test teardown failed"),
        }
        result
    }

    /// Cancels the suite token and removes the temp root.
    ///
    /// A test that is still active is torn down first. The suite ends up
    /// [`SuiteState::Terminated`] whatever happens.
    pub async fn teardown_suite(&mut self) -> Result<(), HarnessError> {
        if !matches!(self.state, SuiteState::SuiteReady | SuiteState::TestReady) {
            return Err(self.invalid("tear down suite"));
        }

        let mut failures = Vec::new();
        if self.state == SuiteState::TestReady {
            if let Err(e) = self.teardown_test().await {
                failures.push(e);
            }
        }

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.scheduler = None;
        self.cli = None;

        if let Some(temp_root) = self.temp_root.take() {
            let path = temp_root.path().display().to_string();
            if let Err(e) = temp_root.close() {
                failures.push(HarnessError::Filesystem {
                    op: "remove",
                    path,
                    reason: e.to_string(),
                });
            }
        }

        self.state = SuiteState::Terminated;
        info!(suite = %self.id, failures = failures.len(), "suite torn down");
        collect(failures)
    }

    /// Runs `body` between [`setup_test`](Self::setup_test) and
    /// [`teardown_test`](Self::teardown_test).
    ///
    /// Teardown always runs. A setup or teardown failure panics, failing the
    /// test. A panic in `body` is re-raised after teardown.
    pub async fn run_test<F, Fut>(&mut self, name: &str, body: F)
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ctx = match self.setup_test(name).await {
            Ok(ctx) => ctx,
            Err(e) => panic!("fixture setup for '{name}' failed: {e}"),
        };

        let span = info_span!("test", suite = %self.id, test = name);
        let outcome = tokio::spawn(body(ctx).instrument(span)).await;
        let teardown = self.teardown_test().await;

        let result = if outcome.is_ok() { "passed" } else { "failed" };
        metrics::counter!(m::FIXTURE_TESTS_TOTAL, m::LABEL_RESULT => result).increment(1);

        if let Err(join_err) = outcome {
            if let Err(e) = &teardown {
                error!(suite = %self.id, test = name, error = %e, "teardown after failed test");
            }
            if join_err.is_panic() {
                std::panic::resume_unwind(join_err.into_panic());
            }
            panic!("test '{name}' did not complete: {join_err}");
        }

        if let Err(e) = teardown {
            panic!("fixture teardown for '{name}' failed: {e}");
        }
    }

    /// Suite id, attached to every log line the suite emits.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SuiteState {
        self.state
    }

    /// Returns `true` if the suite wants `fixture`.
    pub fn wants(&self, fixture: Fixture) -> bool {
        self.fixtures.wants(fixture)
    }

    /// Configuration the suite was built with.
    pub fn config(&self) -> &TestkitConfig {
        &self.config
    }

    /// Suite temp root; `None` before setup and after teardown.
    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_ref().map(TempDir::path)
    }

    /// Joins `parts` onto the scratch directory path.
    ///
    /// The path is computed whether or not the directory currently exists.
    pub fn scratch_path<I, P>(&self, parts: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.scratch_dir().ok().map(|dir| join_parts(&dir, parts))
    }

    /// Orchestration CLI handle.
    pub fn cli(&self) -> Result<&Executable, HarnessError> {
        self.cli.as_ref().ok_or_else(|| self.invalid("use the cli"))
    }

    /// Scheduler handle, when the scheduler fixture is wanted.
    pub fn scheduler(&self) -> Option<&Executable> {
        self.scheduler.as_ref()
    }

    /// Returns `true` while a background scheduler run is alive.
    pub fn is_scheduler_running(&mut self) -> bool {
        self.scheduler_run
            .as_mut()
            .is_some_and(BackgroundRun::is_running)
    }

    /// Suite lifetime token.
    pub fn cancel_token(&self) -> Result<&CancellationToken, HarnessError> {
        self.cancel
            .as_ref()
            .ok_or_else(|| self.invalid("use the cancel token"))
    }

    async fn provision(&mut self, fixture: Fixture) -> Result<(), HarnessError> {
        match fixture {
            Fixture::ScratchStorage => create_scratch_dir(&self.scratch_dir()?).await,
            Fixture::SchedulerServer => {
                let scheduler = self
                    .scheduler
                    .as_ref()
                    .ok_or_else(|| self.invalid("start the scheduler"))?;
                let run = scheduler.run_background(self.cancel_token()?).await?;
                self.scheduler_run = Some(run);
                Ok(())
            }
            Fixture::Registry => {
                debug!(suite = %self.id, "registry mock is installed by test code");
                Ok(())
            }
        }
    }

    async fn release(&mut self, fixture: Fixture) -> Result<(), HarnessError> {
        match fixture {
            Fixture::ScratchStorage => remove_scratch_dir(&self.scratch_dir()?).await,
            Fixture::SchedulerServer => match self.scheduler_run.take() {
                Some(run) => run.stop().await,
                None => Ok(()),
            },
            Fixture::Registry => Ok(()),
        }
    }

    async fn release_all(&mut self) -> Result<(), HarnessError> {
        let mut failures = Vec::new();
        let fixtures = self.fixtures;
        for fixture in fixtures.iter_teardown() {
            let result = self.release(fixture).await;
            record(m::FIXTURE_TEARDOWNS_TOTAL, fixture, result.is_ok());
            if let Err(e) = result {
                failures.push(e);
            }
        }
        collect(failures)
    }

    fn scratch_dir(&self) -> Result<PathBuf, HarnessError> {
        self.temp_root
            .as_ref()
            .map(|root| root.path().join(&self.config.suite.scratch_dir_name))
            .ok_or_else(|| self.invalid("locate scratch storage"))
    }

    fn expect_state(&self, expected: SuiteState, operation: &'static str) -> Result<(), HarnessError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> HarnessError {
        HarnessError::InvalidTransition {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("id", &self.id)
            .field("fixtures", &self.fixtures)
            .field("state", &self.state)
            .field("temp_root", &self.temp_root())
            .field("current_test", &self.current_test)
            .finish()
    }
}

impl Drop for Suite {
    fn drop(&mut self) {
        if matches!(self.state, SuiteState::SuiteReady | SuiteState::TestReady) {
            warn!(
                suite = %self.id,
                state = %self.state,
                "suite dropped without teardown_suite; cleaning up"
            );
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
        }
    }
}

fn join_parts<I, P>(base: &Path, parts: I) -> PathBuf
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut path = base.to_path_buf();
    path.extend(parts);
    path
}

fn record(metric: &'static str, fixture: Fixture, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!(metric, m::LABEL_FIXTURE => fixture.as_str(), m::LABEL_RESULT => result)
        .increment(1);
}

fn collect(mut failures: Vec<HarnessError>) -> Result<(), HarnessError> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(HarnessError::Teardown(failures)),
    }
}
