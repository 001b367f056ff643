//! The container lifecycle: create, stop, remove, wait, and list.
//!
//! The orchestrator owns the registry of records and coordinates the image
//! provider, the process launcher, the resource limiter, and the network
//! provisioner. The registry lock is held only for in-memory changes and
//! stop signals. State file writes take a separate persistence lock, then
//! copy the current record out of the registry, so the file always ends with
//! the latest in-memory state without the registry waiting on disk I/O.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ContainerStatus, NetworkAttachment, NetworkMode};
use burrow_core::cgroup::CgroupLimiter;
use burrow_core::namespace::NamespaceConfig;
use burrow_core::network::NetworkProvisioner;
use burrow_core::network::command::CommandRunner;
use burrow_image::{ImageProvider, ImageStore};
use chrono::Utc;

use crate::container::{ContainerConfig, ContainerRecord};
use crate::handoff::InitHandoff;
use crate::logs;
use crate::process::{self, LaunchRequest, NamespaceLauncher, ProcessLauncher, SpawnedProcess};
use crate::registry::Registry;
use crate::state::StateStore;

/// Time a removed container gets to exit before and after `SIGKILL`.
const REMOVE_GRACE: Duration = Duration::from_secs(2);

/// A post-spawn step that failed without failing the create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateWarning {
    /// Some resource limit could not be applied.
    ResourceLimits(String),
    /// The network could not be attached.
    Network(String),
}

impl fmt::Display for CreateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceLimits(msg) => write!(f, "resource limits not applied: {msg}"),
            Self::Network(msg) => write!(f, "network not attached: {msg}"),
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// Id of the new container.
    pub id: ContainerId,
    /// Effective name.
    pub name: String,
    /// Host pid of the container init.
    pub pid: u32,
    /// Network attachment, if one was made.
    pub network: Option<NetworkAttachment>,
    /// Degraded steps.
    pub warnings: Vec<CreateWarning>,
}

/// Configures the collaborators of an [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    images: Option<Arc<dyn ImageProvider>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
}

impl OrchestratorBuilder {
    /// Uses `images` instead of the on-disk image store.
    #[must_use]
    pub fn images(mut self, images: Arc<dyn ImageProvider>) -> Self {
        self.images = Some(images);
        self
    }

    /// Uses `launcher` instead of the namespace launcher.
    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Runs network commands through `runner`.
    #[must_use]
    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    /// Loads persisted state and builds the orchestrator.
    ///
    /// Records whose process has died since they were saved are marked
    /// stopped, and the addresses of persisted attachments are reserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file is unreadable or a default
    /// collaborator cannot be created.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        let images = match self.images {
            Some(images) => images,
            None => Arc::new(ImageStore::open(&config)?),
        };
        let launcher = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(NamespaceLauncher::default()),
        };
        let network = match self.command_runner {
            Some(runner) => NetworkProvisioner::with_runner(&config, runner)?,
            None => NetworkProvisioner::new(&config)?,
        };

        let store = StateStore::new(config.state_file());
        let records = store.reconcile()?;
        for attachment in records.iter().filter_map(|r| r.network.as_ref()) {
            if let Err(e) = network.restore(attachment) {
                tracing::warn!(ip = ?attachment.ip_address, error = %e, "cannot restore address");
            }
        }
        tracing::debug!(
            data_dir = %config.data_dir().display(),
            containers = records.len(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            limiter: CgroupLimiter::new(&config.cgroup_root),
            registry: Mutex::new(Registry::from_records(records)),
            persist_lock: Mutex::new(()),
            store,
            images,
            launcher,
            network,
            config,
        })
    }
}

/// Owns every container record and drives the lifecycle.
pub struct Orchestrator {
    config: RuntimeConfig,
    registry: Mutex<Registry>,
    persist_lock: Mutex<()>,
    store: StateStore,
    images: Arc<dyn ImageProvider>,
    launcher: Arc<dyn ProcessLauncher>,
    limiter: CgroupLimiter,
    network: NetworkProvisioner,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("data_dir", &self.config.data_dir())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Opens the orchestrator with the default collaborators.
    ///
    /// # Errors
    ///
    /// See [`OrchestratorBuilder::build`].
    pub fn open(config: RuntimeConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Starts configuring an orchestrator.
    #[must_use]
    pub fn builder(config: RuntimeConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            images: None,
            launcher: None,
            command_runner: None,
        }
    }

    /// Runtime configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Creates and starts a container.
    ///
    /// Limits and networking are applied before the command runs. Their
    /// failures degrade the container instead of failing the create and
    /// are reported as warnings.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an empty command or missing volume source,
    /// `DuplicateName` if the name is taken here or by a container another
    /// process has persisted, `RootfsPreparation` if the
    /// image cannot be prepared, and `ProcessStart` if spawning fails. No
    /// record exists after any of these.
    pub fn create(&self, config: ContainerConfig) -> Result<CreateOutcome> {
        validate(&config)?;
        let id = ContainerId::generate();
        let name = if config.name.is_empty() {
            id.short().to_string()
        } else {
            config.name.clone()
        };
        if self.store.name_in_use(&name)? {
            return Err(BurrowError::DuplicateName { name });
        }
        self.lock()?.reserve_name(&name)?;

        let started = self.spawn(&id, &name, &config);
        let (spawned, rootfs) = match started {
            Ok(started) => started,
            Err(e) => {
                self.lock()?.release_name(&name);
                self.remove_container_dir(&id);
                return Err(e);
            }
        };
        let pid = spawned.pid;
        let mode = config.network_mode();

        let mut record = ContainerRecord {
            id: id.clone(),
            name: name.clone(),
            pid,
            status: ContainerStatus::Running,
            rootfs,
            created_at: Utc::now(),
            config,
            network: None,
        };
        if let Err(e) = self.admit(&record) {
            spawned.abort();
            self.lock()?.release_name(&name);
            self.remove_container_dir(&id);
            return Err(e);
        }
        tracing::info!(container_id = %id, name = %name, pid, "container created");

        let mut warnings = Vec::new();
        if let Err(e) = self.limiter.apply(pid, &record.config.resources) {
            tracing::warn!(container_id = %id, error = %e, "continuing without resource limits");
            warnings.push(CreateWarning::ResourceLimits(e.to_string()));
        }

        if mode != NetworkMode::None {
            match self.attach_network(&id, pid, mode) {
                Ok(attachment) => {
                    record.network = Some(attachment);
                    self.update(&id, |r| r.network.clone_from(&record.network))?;
                }
                Err(e) => {
                    tracing::warn!(container_id = %id, error = %e, "continuing without network");
                    warnings.push(CreateWarning::Network(e.to_string()));
                }
            }
        }

        spawned.release();
        Ok(CreateOutcome {
            id,
            name,
            pid,
            network: record.network,
            warnings,
        })
    }

    /// Signals a running container to terminate.
    ///
    /// Sends `SIGTERM`, or `SIGKILL` if that cannot be delivered, and marks
    /// the record stopped without waiting for the exit. A stopped container
    /// is left untouched.
    ///
    /// The container init is PID 1 of its namespace, so a program that does
    /// not handle `SIGTERM` (a plain `/bin/sh`, for one) keeps running after
    /// this returns. [`Orchestrator::remove`] kills such a process.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `ProcessLookup` if the
    /// process cannot be signaled at all.
    pub fn stop(&self, id: &ContainerId) -> Result<()> {
        {
            let mut registry = self.lock()?;
            let record = registry.get_mut(id)?;
            if !record.is_running() {
                tracing::debug!(container_id = %id, "container already stopped");
                return Ok(());
            }
            process::terminate(record.pid)?;
            record.status = ContainerStatus::Stopped;
        }
        self.sync(id);
        tracing::info!(container_id = %id, "container stopped");
        Ok(())
    }

    /// Stops the container if needed, forgets it, and releases its
    /// resources.
    ///
    /// A container that was running gets a short time to exit and is then
    /// killed, so its control groups can be removed. Cleanup of the
    /// container directory, control groups, and network is best-effort;
    /// failures are logged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and the stop error if a running
    /// container cannot be signaled. The record is kept in that case.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let (record, was_running) = {
            let mut registry = self.lock()?;
            let record = registry.get_mut(id)?;
            let was_running = record.is_running();
            if was_running {
                process::terminate(record.pid)?;
                record.status = ContainerStatus::Stopped;
            }
            (registry.remove(id)?, was_running)
        };
        self.sync(id);
        self.release_resources(&record, was_running);
        tracing::info!(container_id = %id, name = %record.name, "container removed");
        Ok(())
    }

    /// Blocks until the container process exits and marks it stopped.
    ///
    /// Returns the exit code (`128 + signal` for a signal death), or `None`
    /// when the status cannot be collected, e.g. the container is already
    /// stopped or was started by another process.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `ProcessLookup` if waiting
    /// fails.
    pub fn wait(&self, id: &ContainerId) -> Result<Option<i32>> {
        let pid = {
            let registry = self.lock()?;
            let record = registry.get(id)?;
            if !record.is_running() {
                return Ok(None);
            }
            record.pid
        };
        let code = process::wait_for_exit(pid)?;
        tracing::info!(container_id = %id, pid, exit_code = ?code, "container exited");

        if let Ok(record) = self.lock()?.get_mut(id) {
            record.status = ContainerStatus::Stopped;
        }
        self.sync(id);
        Ok(code)
    }

    /// Copies every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.lock()?.snapshot())
    }

    /// Copies one record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, id: &ContainerId) -> Result<ContainerRecord> {
        self.lock()?.get(id).cloned()
    }

    /// Finds a container by id, unique id prefix, or name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing matches and `Config` for an ambiguous
    /// prefix.
    pub fn resolve(&self, query: &str) -> Result<ContainerId> {
        self.lock()?.resolve(query)
    }

    /// Reads the captured output of a detached container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Io` if the log is unreadable.
    pub fn logs(&self, id: &ContainerId) -> Result<String> {
        let _ = self.get(id)?;
        logs::read_logs(&self.config.containers_dir(), id.as_str())
    }

    fn spawn(
        &self,
        id: &ContainerId,
        name: &str,
        config: &ContainerConfig,
    ) -> Result<(SpawnedProcess, PathBuf)> {
        let rootfs = self.images.prepare_rootfs(id, &config.image)?;
        let handoff = InitHandoff {
            container_id: id.clone(),
            name: name.to_string(),
            argv: config.command.clone(),
            rootfs: rootfs.clone(),
            volumes: config.volumes.clone(),
            start_fd: None,
        };
        let log_path = logs::log_path(&self.config.containers_dir(), id.as_str());
        let request = LaunchRequest {
            handoff: &handoff,
            namespaces: NamespaceConfig::isolated(config.network_mode().isolates_network()),
            tty: config.tty,
            log_path: &log_path,
        };
        let spawned = self.launcher.launch(&request).map_err(|e| match e {
            BurrowError::ProcessStart { .. } => e,
            other => BurrowError::ProcessStart {
                message: other.to_string(),
            },
        })?;
        Ok((spawned, rootfs))
    }

    /// Reserves addresses other processes have persisted, then attaches.
    fn attach_network(&self, id: &ContainerId, pid: u32, mode: NetworkMode) -> Result<NetworkAttachment> {
        if mode == NetworkMode::Bridge {
            match self.store.load() {
                Ok(records) => {
                    for attachment in records.iter().filter_map(|r| r.network.as_ref()) {
                        if let Err(e) = self.network.restore(attachment) {
                            tracing::debug!(error = %e, "skipping persisted address");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "cannot read persisted addresses"),
            }
        }
        self.network.attach(id, pid, mode)
    }

    fn release_resources(&self, record: &ContainerRecord, was_running: bool) {
        // A stopped record whose child is still alive ignored SIGTERM.
        let still_running = process::try_reap(record.pid);
        if was_running || still_running {
            if let Err(e) = process::ensure_exited(record.pid, REMOVE_GRACE) {
                tracing::warn!(container_id = %record.id, error = %e, "container did not exit");
            }
        }
        self.remove_container_dir(&record.id);
        if let Err(e) = self.limiter.remove(record.pid) {
            tracing::warn!(container_id = %record.id, error = %e, "cgroup cleanup failed");
        }
        if let Some(attachment) = &record.network {
            if let Err(e) = self.network.detach(attachment) {
                tracing::warn!(container_id = %record.id, error = %e, "network cleanup failed");
            }
        }
    }

    fn remove_container_dir(&self, id: &ContainerId) {
        let dir = self.config.container_dir(id.as_str());
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "container directory not removed");
            }
        }
    }

    fn update(&self, id: &ContainerId, change: impl FnOnce(&mut ContainerRecord)) -> Result<()> {
        if let Ok(record) = self.lock()?.get_mut(id) {
            change(record);
        }
        self.sync(id);
        Ok(())
    }

    /// Persists a new record and registers it, unless another process has
    /// persisted a container with the same name.
    fn admit(&self, record: &ContainerRecord) -> Result<()> {
        let _persist = self.lock_persist()?;
        match self.store.insert_unique(record) {
            Ok(()) => {}
            Err(e @ BurrowError::DuplicateName { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(container_id = %record.id, error = %e, "failed to persist state");
            }
        }
        self.lock()?.insert(record.clone());
        Ok(())
    }

    /// Writes the current in-memory state of `id` to the state file, or
    /// deletes it there if the registry no longer has it.
    fn sync(&self, id: &ContainerId) {
        let result = self.lock_persist().and_then(|_persist| {
            let current = self.lock()?.get(id).ok().cloned();
            match current {
                Some(record) => self.store.upsert(&record),
                None => self.store.delete(id),
            }
        });
        if let Err(e) = result {
            tracing::warn!(container_id = %id, error = %e, "failed to persist state");
        }
    }

    fn lock_persist(&self) -> Result<MutexGuard<'_, ()>> {
        self.persist_lock.lock().map_err(|_| BurrowError::Config {
            message: "state persistence lock poisoned".into(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>> {
        self.registry.lock().map_err(|_| BurrowError::Config {
            message: "container registry lock poisoned".into(),
        })
    }
}

fn validate(config: &ContainerConfig) -> Result<()> {
    if config.command.first().is_none_or(String::is_empty) {
        return Err(BurrowError::Config {
            message: "container command must not be empty".into(),
        });
    }
    if let Some(volume) = config.volumes.iter().find(|v| !v.host_path.exists()) {
        return Err(BurrowError::Config {
            message: format!("volume source {} does not exist", volume.host_path.display()),
        });
    }
    Ok(())
}
