//! R backend process supervisor.
//!
//! Owns the single child process handle. `start` locates `Rscript`, launches
//! the Plumber API with the local package library taking priority, and checks
//! that it survived the startup delay. `stop` sends SIGTERM (a hard kill on
//! other platforms) and clears the handle. Dropping the supervisor stops the
//! child.

use super::locator::ExecutableLocator;
use crate::config::BackendConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `stop` waits for the child to exit after SIGTERM.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Manages the R Plumber child process.
pub struct Supervisor {
    locator: ExecutableLocator,
    workdir: PathBuf,
    lib_dir: PathBuf,
    lib_env_var: String,
    route_file: String,
    port: u16,
    startup_wait: Duration,
    child: Option<Child>,
}

impl Supervisor {
    /// Create a supervisor. Nothing is launched until [`Supervisor::start`].
    pub fn new(config: &BackendConfig, workdir: PathBuf) -> Self {
        Self {
            locator: ExecutableLocator::from_config(config),
            lib_dir: workdir.join(&config.lib_dir),
            workdir,
            lib_env_var: config.lib_env_var.clone(),
            route_file: config.route_file.clone(),
            port: config.port,
            startup_wait: Duration::from_secs(config.startup_wait_secs),
            child: None,
        }
    }

    /// Replace the interpreter search chain.
    #[cfg(test)]
    pub fn with_locator(mut self, locator: ExecutableLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Launch the backend. Failures are logged and leave the handle absent
    /// so the server keeps running and reports the backend as unreachable.
    pub async fn start(&mut self) {
        if self.child.is_some() {
            warn!("R backend already started (PID {:?})", self.pid());
            return;
        }

        info!("🚀 Starting R Plumber API...");

        let Some(executable) = self.locator.locate() else {
            error!("❌ CRITICAL ERROR: 'Rscript' not found in PATH or standard locations.");
            error!("   Please install R or add it to your PATH.");
            debug!("Searched: {:?}", self.locator.strategies());
            return;
        };

        info!("   Using R executable: {}", executable.display());

        let command = self.build_command(&executable);
        self.spawn_and_confirm(command).await;
    }

    /// Spawn `command`, wait out the startup delay, then report whether the
    /// child is still alive.
    async fn spawn_and_confirm(&mut self, mut command: Command) -> bool {
        match command.spawn() {
            Ok(child) => {
                debug!("R backend spawned with PID {}", child.id());
                self.child = Some(child);
            }
            Err(e) => {
                error!("❌ Failed to start R subprocess: {}", e);
                return false;
            }
        }

        tokio::time::sleep(self.startup_wait).await;

        if self.is_running() {
            info!("✅ R Server started on port {}", self.port);
            true
        } else {
            error!("❌ R Server failed to start instantly.");
            false
        }
    }

    /// Build the `Rscript -e ...` invocation.
    fn build_command(&self, executable: &Path) -> Command {
        let lib_value = library_env_value(&self.lib_dir, std::env::var_os(&self.lib_env_var));

        let mut command = Command::new(executable);
        command
            .arg("-e")
            .arg(plumber_expression(&self.lib_dir, &self.route_file, self.port))
            .current_dir(&self.workdir)
            .env(&self.lib_env_var, lib_value)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }

    /// Whether a child is held and has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            None => false,
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("R backend exited: {}", status);
                false
            }
            Some(Err(e)) => {
                warn!("Cannot query R backend status: {}", e);
                false
            }
        }
    }

    /// PID of the held child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Terminate the child and clear the handle. No-op without a child.
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("R backend already exited: {}", status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot query R backend status: {}", e),
        }

        info!("🛑 Stopping R Server (PID {})...", child.id());
        terminate(&mut child);
        reap(child, STOP_GRACE_PERIOD);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: `pid` belongs to a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        warn!(
            "SIGTERM to PID {} failed ({}), killing",
            pid,
            std::io::Error::last_os_error()
        );
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill R backend: {}", e);
    }
}

/// Wait up to `grace` for the child to exit, then kill it.
fn reap(mut child: Child, grace: Duration) {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!("R Server exited with status: {}", status);
                return;
            }
            Ok(None) if Instant::now() >= deadline => {
                warn!("R Server did not exit gracefully, killing");
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                error!("Error waiting for R Server: {}", e);
                let _ = child.kill();
                return;
            }
        }
    }
}

/// Value for the library env var with `lib_dir` first, followed by any
/// existing entries.
pub fn library_env_value(lib_dir: &Path, existing: Option<OsString>) -> OsString {
    let existing = existing.filter(|v| !v.is_empty());
    let Some(existing) = existing else {
        return lib_dir.as_os_str().to_owned();
    };

    let paths = std::iter::once(lib_dir.to_path_buf()).chain(std::env::split_paths(&existing));
    match std::env::join_paths(paths) {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Cannot prepend {} to library path: {}", lib_dir.display(), e);
            lib_dir.as_os_str().to_owned()
        }
    }
}

/// R expression that puts `lib_dir` first on `.libPaths()`, loads plumber,
/// plumbs `route_file`, and serves on `port`.
pub fn plumber_expression(lib_dir: &Path, route_file: &str, port: u16) -> String {
    let lib_path = r_string_literal(&lib_dir.to_string_lossy().replace('\\', "/"));
    let route_file = r_string_literal(route_file);
    format!(
        "lib_path <- {lib_path}; .libPaths(c(lib_path, .libPaths())); \
         library(plumber); pr <- plumb({route_file}); pr$run(port={port})"
    )
}

fn r_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
