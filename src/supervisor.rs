//! Supervisor engine and management facade.
//!
//! One background thread owns a cooperative event loop multiplexing the
//! SIGCHLD self-pipe with the timer wheel. The signal handler itself only
//! writes a byte; the loop turns that byte into a zero-delay reap task, and
//! the reap task feeds the retry state machine. Management calls arrive on
//! other threads through [`SupervisorHandle`] and contend on the
//! supervisor-wide mutex, so every state transition observes program order.

use std::{
    fs::File,
    io::{self, Read},
    os::fd::{AsFd, AsRawFd, OwnedFd},
    path::PathBuf,
    process::Command,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicI32, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction},
    unistd::{pipe2, write},
};
use tracing::{debug, error, info, warn};

use crate::{
    constants::DEFAULT_SETTING_FILE,
    error::SupervisorError,
    service::{ServiceInfo, ServiceRecord, ServiceStatus, ServiceTable, StartupType},
    setting::Setting,
    timer::Utimer,
};

/// Wake byte written by the SIGCHLD handler.
const WAKE_SIGCHLD: u8 = b'c';

/// Wake byte written by [`Supervisor::shutdown`].
const WAKE_SHUTDOWN: u8 = b'q';

/// Write end of the self-pipe, published for the signal handler.
static WAKE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// SIGCHLD handler: a single non-blocking write is the only
/// async-signal-safe work allowed here.
extern "C" fn forward_sigchld(_signal: libc::c_int) {
    let fd = WAKE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let buf = [WAKE_SIGCHLD];
        unsafe { libc::write(fd, buf.as_ptr().cast(), 1) };
    }
}

/// Initialization parameters for [`Supervisor::init`].
#[derive(Debug, Clone)]
pub struct InitParams {
    /// Path of the XML setting file.
    pub setting_file: PathBuf,
}

impl InitParams {
    /// Parameters pointing at the given setting file.
    pub fn new(setting_file: impl Into<PathBuf>) -> Self {
        Self {
            setting_file: setting_file.into(),
        }
    }
}

impl Default for InitParams {
    fn default() -> Self {
        Self::new(DEFAULT_SETTING_FILE)
    }
}

/// Tasks scheduled on the timer wheel.
#[derive(Debug)]
enum TimerTask {
    /// Collect exited children and feed the retry machine.
    Reap,
    /// Delayed restart of one service.
    Retry {
        /// Name of the service to respawn.
        service: String,
    },
}

#[derive(Debug)]
struct SupervisorInner {
    setting: Setting,
    table: ServiceTable,
    timers: Utimer<TimerTask>,
    shut_down: bool,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<SupervisorInner>,
    wake_write: OwnedFd,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, SupervisorInner>, SupervisorError> {
        self.inner.lock().map_err(SupervisorError::from)
    }
}

/// The service supervisor daemon.
///
/// Owns the setting store, the service table, and the event-loop thread.
/// Dropping the supervisor shuts it down. The SIGCHLD disposition is
/// process-wide, so at most one supervisor should be live per process.
#[derive(Debug)]
pub struct Supervisor {
    shared: Arc<Shared>,
    loop_thread: Option<JoinHandle<()>>,
}

/// Cloneable handle exposing the management API from other threads.
#[derive(Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Boots the supervisor: loads the setting file, installs the SIGCHLD
    /// handler, starts the event loop, and launches every service whose
    /// startup type is automatic.
    pub fn init(params: InitParams) -> Result<Self, SupervisorError> {
        info!("initializing service supervisor");
        let mut setting = Setting::load(params.setting_file)?;
        let table = ServiceTable::from_entries(setting.take_services());

        let (wake_read, wake_write) = pipe2(OFlag::O_NONBLOCK)?;
        WAKE_WRITE_FD.store(wake_write.as_raw_fd(), Ordering::SeqCst);
        install_sigchld_handler()?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(SupervisorInner {
                setting,
                table,
                timers: Utimer::new(),
                shut_down: false,
            }),
            wake_write,
        });

        let loop_shared = Arc::clone(&shared);
        let loop_thread = thread::Builder::new()
            .name("warden-supervisor".into())
            .spawn(move || event_loop(loop_shared, wake_read))
            .map_err(SupervisorError::Io)?;

        let supervisor = Self {
            shared,
            loop_thread: Some(loop_thread),
        };
        supervisor.start_automatic_services()?;
        Ok(supervisor)
    }

    /// Handle for issuing management calls, typically from other threads.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Launches every automatic service, in declaration order.
    fn start_automatic_services(&self) -> Result<(), SupervisorError> {
        let mut inner = self.shared.lock()?;
        info!("starting automatic services");
        for index in 0..inner.table.len() {
            let record = inner.table.get_mut(index);
            record.status = ServiceStatus::Stopped;
            if record.startup_type == StartupType::Automatic {
                record.status = ServiceStatus::Starting;
                spawn_service(record)?;
            }
        }
        Ok(())
    }

    /// Stops every service and tears the supervisor down.
    ///
    /// SIGCHLD is ignored first so the children killed below do not re-enter
    /// the reap machinery; pending timer tasks are dropped; every record is
    /// marked terminated. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<(), SupervisorError> {
        {
            let mut inner = self.shared.lock()?;
            if inner.shut_down {
                return Ok(());
            }
            inner.shut_down = true;
        }
        info!("shutting down service supervisor");

        ignore_sigchld();
        WAKE_WRITE_FD.store(-1, Ordering::SeqCst);
        if let Err(err) = write(self.shared.wake_write.as_fd(), &[WAKE_SHUTDOWN]) {
            warn!(error = %err, "failed to wake supervisor loop for shutdown");
        }
        if let Some(handle) = self.loop_thread.take() {
            let _ = handle.join();
        }

        let mut inner = self.shared.lock()?;
        inner.timers.clear();
        stop_all_services(&mut inner);
        Ok(())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl SupervisorHandle {
    /// Returns a copy of (name, status, startup type) for every record, in
    /// declaration order.
    pub fn list_services(&self) -> Result<Vec<ServiceInfo>, SupervisorError> {
        let inner = self.shared.lock()?;
        ensure_live(&inner)?;
        Ok(inner.table.iter().map(ServiceRecord::info).collect())
    }

    /// Snapshot of one service.
    pub fn service_info(&self, name: &str) -> Result<ServiceInfo, SupervisorError> {
        let inner = self.shared.lock()?;
        ensure_live(&inner)?;
        inner.table.find(name).map(ServiceRecord::info)
    }

    /// Starts a service unless it is already running.
    ///
    /// The retry counter is deliberately left alone up front: operator
    /// starts share the retry budget with the supervisor, and only a spawn
    /// that actually reaches running resets the burst.
    pub fn start_service(&self, name: &str) -> Result<(), SupervisorError> {
        let mut inner = self.shared.lock()?;
        ensure_live(&inner)?;
        let index = inner
            .table
            .position(name)
            .ok_or_else(|| SupervisorError::ServiceNotFound(name.to_string()))?;
        let record = inner.table.get_mut(index);
        if record.status == ServiceStatus::Running {
            // Already in the target state.
            return Ok(());
        }
        record.status = ServiceStatus::Starting;
        spawn_service(record)
    }

    /// Stops a running service; stopping an already stopped or errored
    /// service succeeds without effect.
    pub fn stop_service(&self, name: &str) -> Result<(), SupervisorError> {
        let mut inner = self.shared.lock()?;
        ensure_live(&inner)?;
        let index = inner
            .table
            .position(name)
            .ok_or_else(|| SupervisorError::ServiceNotFound(name.to_string()))?;
        let record = inner.table.get_mut(index);
        match record.status {
            ServiceStatus::Running => {
                record.status = ServiceStatus::Stopping;
                let result = terminate_child(record);
                record.status = ServiceStatus::Stopped;
                result
            }
            _ => Ok(()),
        }
    }

    /// Changes a service's startup type and persists the setting file.
    ///
    /// A no-op when the type is unchanged. When the write-back fails the
    /// in-memory record is rolled back and the persistence error surfaces.
    pub fn set_startup_type(
        &self,
        name: &str,
        startup_type: StartupType,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.shared.lock()?;
        ensure_live(&inner)?;
        let index = inner
            .table
            .position(name)
            .ok_or_else(|| SupervisorError::ServiceNotFound(name.to_string()))?;
        if inner.table.get(index).startup_type == startup_type {
            return Ok(());
        }
        info!(service = name, startup_type = %startup_type, "changing service startup type");

        let previous = inner.table.get(index).startup_type;
        let node = inner.table.get(index).startup_node;
        inner.table.get_mut(index).startup_type = startup_type;
        match inner.setting.change_startup_type(node, startup_type) {
            Ok(()) => Ok(()),
            Err(err) => {
                inner.table.get_mut(index).startup_type = previous;
                Err(err)
            }
        }
    }
}

fn ensure_live(inner: &SupervisorInner) -> Result<(), SupervisorError> {
    if inner.shut_down {
        Err(SupervisorError::ShutDown)
    } else {
        Ok(())
    }
}

fn install_sigchld_handler() -> Result<(), SupervisorError> {
    let action = SigAction::new(
        SigHandler::Handler(forward_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGCHLD, &action) }?;
    Ok(())
}

fn ignore_sigchld() {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    if let Err(err) = unsafe { sigaction(Signal::SIGCHLD, &action) } {
        warn!(error = %err, "failed to ignore SIGCHLD");
    }
}

/// Spawns the child process for a record and stamps the outcome.
///
/// A spawn that succeeds from an explicit start request (status starting)
/// ends the failure burst and resets the retry counter; respawns from the
/// awaiting-restart sentinel keep their budget.
fn spawn_service(record: &mut ServiceRecord) -> Result<(), SupervisorError> {
    info!(service = %record.name, command = %record.command_line(), "starting service");
    let mut command = Command::new(&record.cmd_path);
    if let Some(param) = &record.cmd_param {
        command.args(param.split_whitespace());
    }
    match command.spawn() {
        Ok(child) => {
            let from_starting = record.status == ServiceStatus::Starting;
            record.status = ServiceStatus::Running;
            record.child = Some(child);
            if from_starting {
                record.retry_count = 0;
            }
            Ok(())
        }
        Err(source) => {
            record.status = ServiceStatus::Error;
            record.child = None;
            error!(service = %record.name, error = %source, "failed to start service");
            Err(SupervisorError::SpawnFailed {
                service: record.name.clone(),
                source,
            })
        }
    }
}

/// Kills and reaps a record's child, if it has one.
fn terminate_child(record: &mut ServiceRecord) -> Result<(), SupervisorError> {
    info!(service = %record.name, "stopping service");
    if let Some(mut child) = record.child.take() {
        child.kill().map_err(|source| SupervisorError::StopFailed {
            service: record.name.clone(),
            source,
        })?;
        // Reap so the stopped child does not linger as a zombie.
        let _ = child.wait();
    }
    Ok(())
}

fn stop_all_services(inner: &mut SupervisorInner) {
    info!("stopping all services");
    for record in inner.table.iter_mut() {
        if record.status == ServiceStatus::Running
            && let Err(err) = terminate_child(record)
        {
            warn!(service = %record.name, error = %err, "failed to stop service during shutdown");
        }
        record.status = ServiceStatus::Terminated;
        record.child = None;
    }
}

/// Feeds one unexpected termination into the retry machine.
///
/// The Nth consecutive retry waits N-1 seconds: the first attempt respawns
/// immediately, later ones go through the timer wheel while the status
/// stays running as the awaiting-restart sentinel. Once the cap is reached
/// the service parks in error until an operator starts it.
fn schedule_restart(inner: &mut SupervisorInner, index: usize) {
    let cap = inner.setting.max_failure_retry_count;
    let record = inner.table.get_mut(index);
    info!(
        service = %record.name,
        retry_count = record.retry_count,
        "attempting service restart"
    );
    if record.retry_count < cap {
        let delay = u64::from(record.retry_count);
        record.retry_count = record.retry_count.saturating_add(1);
        if delay == 0 {
            retry_spawn(inner, index);
        } else {
            let service = record.name.clone();
            inner
                .timers
                .add(Duration::from_secs(delay), TimerTask::Retry { service });
        }
    } else {
        record.status = ServiceStatus::Error;
        warn!(service = %record.name, "retry budget exhausted, marking service in error");
    }
}

/// Respawn attempt on the retry path. A failure is logged by the spawn and
/// re-queued under the cap instead of surfacing to a caller.
fn retry_spawn(inner: &mut SupervisorInner, index: usize) {
    if spawn_service(inner.table.get_mut(index)).is_err() {
        let cap = inner.setting.max_failure_retry_count;
        let record = inner.table.get_mut(index);
        if record.retry_count < cap {
            // Budget remains; rearm the sentinel before requeueing.
            record.status = ServiceStatus::Running;
        }
        schedule_restart(inner, index);
    }
}

/// Collects exited children and feeds each into the retry machine.
///
/// A single SIGCHLD may coalesce several terminations, so the scan repeats
/// until a pass observes none.
fn reap_children(inner: &mut SupervisorInner) {
    debug!("reaping exited children");
    loop {
        let mut exited: Vec<usize> = Vec::new();
        for (index, record) in inner.table.iter_mut().enumerate() {
            if record.status != ServiceStatus::Running {
                continue;
            }
            let Some(child) = record.child.as_mut() else {
                continue;
            };
            let waited = child.try_wait();
            match waited {
                Ok(Some(status)) => {
                    info!(
                        service = %record.name,
                        startup_type = %record.startup_type,
                        exit_status = %status,
                        "service terminated unexpectedly"
                    );
                    record.child = None;
                    exited.push(index);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(service = %record.name, error = %err, "wait on child failed");
                    record.child = None;
                    exited.push(index);
                }
            }
        }
        if exited.is_empty() {
            break;
        }
        for index in exited {
            schedule_restart(inner, index);
        }
    }
}

fn run_timer_task(inner: &mut SupervisorInner, task: TimerTask) {
    match task {
        TimerTask::Reap => reap_children(inner),
        TimerTask::Retry { service } => {
            let Some(index) = inner.table.position(&service) else {
                return;
            };
            let record = inner.table.get(index);
            debug!(service = %service, status = %record.status, "delayed restart timer fired");
            // An operator stop during the delay moves the status away from
            // running; the fired task is then a no-op.
            if record.status == ServiceStatus::Running && record.child.is_none() {
                retry_spawn(inner, index);
            }
        }
    }
}

/// The supervisor event loop: sleeps until the next timer deadline or a
/// wake byte, converts SIGCHLD wakes into zero-delay reap tasks, and runs
/// whatever is due.
fn event_loop(shared: Arc<Shared>, wake_read: OwnedFd) {
    let mut wake_pipe = File::from(wake_read);
    debug!("supervisor event loop running");
    loop {
        let deadline = match shared.inner.lock() {
            Ok(inner) => {
                if inner.shut_down {
                    break;
                }
                inner.timers.next_deadline()
            }
            Err(_) => break,
        };

        let timeout = match deadline {
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                let millis =
                    remaining.as_millis().min(u128::from(u16::MAX - 1)) as u16;
                PollTimeout::from(millis.saturating_add(1))
            }
            None => PollTimeout::NONE,
        };

        {
            let mut fds = [PollFd::new(wake_pipe.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => {}
                Err(err) => {
                    error!(error = %err, "supervisor poll failed");
                    break;
                }
            }
        }

        let mut saw_sigchld = false;
        let mut saw_shutdown = false;
        let mut buf = [0u8; 64];
        loop {
            match wake_pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(count) => {
                    for byte in &buf[..count] {
                        match *byte {
                            WAKE_SIGCHLD => saw_sigchld = true,
                            WAKE_SHUTDOWN => saw_shutdown = true,
                            _ => {}
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(error = %err, "wake pipe read failed");
                    break;
                }
            }
        }

        let mut inner = match shared.inner.lock() {
            Ok(guard) => guard,
            Err(_) => break,
        };
        if saw_sigchld && !inner.shut_down {
            // Handler work is deferred here, out of signal context, through
            // a zero-delay wheel entry.
            inner.timers.add(Duration::ZERO, TimerTask::Reap);
        }
        for task in inner.timers.take_due(Instant::now()) {
            run_timer_task(&mut inner, task);
        }
        if saw_shutdown || inner.shut_down {
            break;
        }
    }
    debug!("supervisor event loop stopped");
}
