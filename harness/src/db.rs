// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tools for starting and stopping a CockroachDB server process.
//!
//! The pieces here follow the lifecycle of one database instance:
//!
//! * [`CockroachStarterBuilder`] collects configuration and computes
//!   defaults exactly once, in [`CockroachStarterBuilder::build`];
//! * [`CockroachStarter`] holds the fully rendered command and launches it
//!   ([`CockroachStarter::start`] consumes the starter, so a second start of
//!   the same instance does not compile);
//! * [`CockroachInstance`] owns the running child and tears it down in
//!   [`CockroachInstance::cleanup`].

use std::collections::BTreeSet;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::{Builder, Utf8TempDir};
use slog::{info, o, warn, Logger};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::context::Context;
use crate::install::{Catalog, Installer, OsKind};
use crate::port::{pick_unused_port, PortRange};

/// Version of CockroachDB installed when no executable is supplied.
pub const DEFAULT_VERSION: &str = "v1.1.7";

// Default timeout waiting for the database to report itself ready.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

// Default timeout waiting for the process to exit after being killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// Interval between readiness probes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Tag prepended to every forwarded line of the database's output.
const OUTPUT_PREFIX: &str = "crdb> ";

/// How to decide that the database is ready to accept connections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Readiness {
    /// Wait for the pid file and listen-URL file that the server writes
    /// during startup, then probe the advertised TCP address.  The file
    /// artifacts can appear before the listener actually accepts
    /// connections, so the TCP probe is authoritative.
    ///
    /// This is the only strategy that works with auto-assigned ports, since
    /// the server itself reports the port it bound.
    #[default]
    Files,

    /// Probe the configured (host, port) directly.  Requires the port to be
    /// chosen up front; port 0 is filled in from [`pick_unused_port`] at
    /// build time.
    Port,
}

/// An error starting the database process.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to execute {cmd:?}")]
    Spawn {
        cmd: String,
        #[source]
        err: std::io::Error,
    },

    #[error("database process exited with {status} before accepting connections")]
    Exited { status: ExitStatus },

    #[error("error checking on the database process")]
    Wait(#[source] std::io::Error),

    #[error("could not parse listen URL {url:?}")]
    InvalidUrl { url: String },

    #[error(
        "timed out after {elapsed:?} waiting for the database to become \
         ready (last seen pid: {pid:?}, address: {addr:?})"
    )]
    TimedOut {
        elapsed: Duration,
        pid: Option<u32>,
        addr: Option<(String, u16)>,
    },
}

/// An error stopping the database process.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("instance was already cleaned up")]
    InvalidState,

    #[error("failed to kill database process {pid}")]
    Kill {
        pid: u32,
        #[source]
        err: std::io::Error,
    },

    #[error("database process {pid} did not exit within {waited:?} of being killed")]
    ShutdownTimeout { pid: u32, waited: Duration },

    #[error("error waiting for database process {pid} to exit")]
    Wait {
        pid: u32,
        #[source]
        err: std::io::Error,
    },
}

/// An error preparing a starter in [`CockroachStarterBuilder::build`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to create a temporary directory for the database")]
    TempDir(#[source] std::io::Error),

    #[error(transparent)]
    Install(#[from] crate::install::InstallError),

    #[error(transparent)]
    Port(#[from] crate::port::PortError),
}

/// Connection details for a running database, only ever handed out after a
/// TCP connection to (host, port) has succeeded at least once.
#[derive(Clone, Debug)]
pub struct ProcessDetails {
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub url: String,
}

/// Hook invoked once the database is ready, before `start` returns.  Data
/// stashed in the [`Context`] is available from the instance for the rest
/// of its life.
pub type ReadyHook = Box<dyn FnOnce(&ProcessDetails, &mut Context) + Send>;

type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Clone, Debug)]
enum Store {
    // A "data" directory inside the instance temp dir.
    TempDir,
    // A caller-supplied directory, left in place at cleanup.
    Dir(Utf8PathBuf),
    // An in-memory store of the given size.
    Memory(String),
}

/// Builder for configuring a database instance before launching it.
///
/// Defaults that require side effects (installing a binary, creating the
/// temporary directory, picking ports) are deferred to [`Self::build`] so
/// that they are computed exactly once.
pub struct CockroachStarterBuilder {
    log: Logger,
    version: String,
    executable: Option<Utf8PathBuf>,
    catalog: Catalog,
    host: String,
    port: u16,
    http_port: u16,
    http_host: Option<String>,
    advertise_host: Option<String>,
    attrs: Option<String>,
    locality: Option<String>,
    join: Option<String>,
    certs_dir: Option<Utf8PathBuf>,
    cache_mib: Option<u64>,
    max_sql_memory_mib: Option<u64>,
    max_disk_temp_storage_mib: Option<u64>,
    max_offset: Option<u64>,
    secure: bool,
    background: bool,
    store: Store,
    keep_data_dir: bool,
    readiness: Readiness,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
    poll_interval: Duration,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    on_ready: Option<ReadyHook>,
}

impl Default for CockroachStarterBuilder {
    fn default() -> Self {
        CockroachStarterBuilder::new()
    }
}

impl CockroachStarterBuilder {
    pub fn new() -> CockroachStarterBuilder {
        CockroachStarterBuilder {
            log: Logger::root(slog::Discard, o!()),
            version: DEFAULT_VERSION.to_string(),
            executable: None,
            catalog: Catalog::new(),
            host: String::from("localhost"),
            port: 0,
            http_port: 0,
            http_host: None,
            advertise_host: None,
            attrs: None,
            locality: None,
            join: None,
            certs_dir: None,
            cache_mib: Some(3),
            max_sql_memory_mib: Some(3),
            max_disk_temp_storage_mib: None,
            max_offset: None,
            secure: false,
            background: false,
            store: Store::TempDir,
            keep_data_dir: false,
            readiness: Readiness::Files,
            startup_timeout: STARTUP_TIMEOUT,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            stdout: None,
            stderr: None,
            on_ready: None,
        }
    }

    pub fn logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Uses this executable instead of resolving one through the installer.
    pub fn executable(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Version to install when no executable is supplied.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Binary sources consulted when no executable is supplied.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// SQL port to listen on.  0 (the default) means auto-assigned: by the
    /// server itself under [`Readiness::Files`], or by the port picker at
    /// build time under [`Readiness::Port`].
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Admin UI port.  0 (the default) behaves like [`Self::port`].
    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn http_host(mut self, host: impl Into<String>) -> Self {
        self.http_host = Some(host.into());
        self
    }

    pub fn advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = Some(host.into());
        self
    }

    pub fn attrs(mut self, attrs: impl Into<String>) -> Self {
        self.attrs = Some(attrs.into());
        self
    }

    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = Some(locality.into());
        self
    }

    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.join = Some(join.into());
        self
    }

    /// Runs in secure mode with certificates from this directory.
    pub fn certs_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.secure = true;
        self.certs_dir = Some(dir.into());
        self
    }

    /// Switches off the `--insecure` flag without configuring certificates.
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn cache_mib(mut self, mib: u64) -> Self {
        self.cache_mib = Some(mib);
        self
    }

    pub fn max_sql_memory_mib(mut self, mib: u64) -> Self {
        self.max_sql_memory_mib = Some(mib);
        self
    }

    pub fn max_disk_temp_storage_mib(mut self, mib: u64) -> Self {
        self.max_disk_temp_storage_mib = Some(mib);
        self
    }

    pub fn max_offset(mut self, max_offset: u64) -> Self {
        self.max_offset = Some(max_offset);
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Stores data in this directory instead of inside the instance temp
    /// dir.  The directory is left in place at cleanup; the caller owns its
    /// lifecycle.
    pub fn store_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.store = Store::Dir(dir.into());
        self
    }

    /// Stores data in memory, e.g. `store_in_memory("640MiB")`.
    pub fn store_in_memory(mut self, size: impl Into<String>) -> Self {
        self.store = Store::Memory(size.into());
        self
    }

    /// Leaves the instance temp dir (pid file, listen-URL file, and default
    /// store) in place at cleanup.
    pub fn keep_data_dir(mut self) -> Self {
        self.keep_data_dir = true;
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Forwards the database's stdout to this sink, one line at a time,
    /// each line prefixed with `crdb> `.
    pub fn stdout(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    /// Forwards the database's stderr like [`Self::stdout`].
    pub fn stderr(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    /// Forwards the database's stdout to this process's stdout.
    pub fn redirect_stdout(self) -> Self {
        self.stdout(tokio::io::stdout())
    }

    /// Forwards the database's stderr to this process's stderr.
    pub fn redirect_stderr(self) -> Self {
        self.stderr(tokio::io::stderr())
    }

    /// Invokes `hook` with the connection details and the instance
    /// [`Context`] once the database is ready.
    pub fn on_ready(
        mut self,
        hook: impl FnOnce(&ProcessDetails, &mut Context) + Send + 'static,
    ) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Finalizes the configuration: resolves the executable, creates the
    /// instance temp dir, picks any ports that need picking, and renders
    /// the command line.
    pub async fn build(self) -> Result<CockroachStarter, BuildError> {
        let executable = match &self.executable {
            Some(path) => path.clone(),
            None => {
                let os = OsKind::current()
                    .map_err(crate::install::InstallError::from)?;
                Installer::new(&self.log, self.catalog.clone())
                    .resolve(os, &self.version)
                    .await?
            }
        };

        let temp_dir = Builder::new()
            .prefix("crdb-harness-")
            .tempdir()
            .map_err(BuildError::TempDir)?;
        let pid_file = temp_dir.path().join("cockroach.pid");
        let url_file = temp_dir.path().join("listen-url");

        let (port, http_port) = match self.readiness {
            // The server reports its own ports through the listen-URL file,
            // so zero can be passed through.
            Readiness::Files => (self.port, self.http_port),
            Readiness::Port => {
                let port = match self.port {
                    0 => pick_unused_port(PortRange::default(), &BTreeSet::new())?,
                    port => port,
                };
                let http_port = match self.http_port {
                    0 => pick_unused_port(
                        PortRange::default(),
                        &BTreeSet::from([port]),
                    )?,
                    http_port => http_port,
                };
                (port, http_port)
            }
        };

        let (store_arg, store_dir) = match &self.store {
            Store::TempDir => {
                let dir = temp_dir.path().join("data");
                (dir.to_string(), Some(dir))
            }
            Store::Dir(dir) => (dir.to_string(), Some(dir.clone())),
            Store::Memory(size) => (format!("type=mem,size={size}"), None),
        };

        // One token per configured flag; unset options are omitted rather
        // than defaulted here.
        let mut args = vec![String::from("start")];
        if let Some(host) = &self.advertise_host {
            args.push(format!("--advertise-host={host}"));
        }
        if let Some(attrs) = &self.attrs {
            args.push(format!("--attrs={attrs}"));
        }
        if self.background {
            args.push(String::from("--background"));
        }
        if let Some(cache) = self.cache_mib {
            args.push(format!("--cache={cache}MiB"));
        }
        if let Some(dir) = &self.certs_dir {
            args.push(format!("--certs-dir={dir}"));
        }
        args.push(format!("--host={}", self.host));
        if let Some(host) = &self.http_host {
            args.push(format!("--http-host={host}"));
        }
        args.push(format!("--http-port={http_port}"));
        if !self.secure {
            args.push(String::from("--insecure"));
        }
        if let Some(join) = &self.join {
            args.push(format!("--join={join}"));
        }
        args.push(format!("--listening-url-file={url_file}"));
        if let Some(locality) = &self.locality {
            args.push(format!("--locality={locality}"));
        }
        if let Some(mib) = self.max_disk_temp_storage_mib {
            args.push(format!("--max-disk-temp-storage={mib}MiB"));
        }
        if let Some(max_offset) = self.max_offset {
            args.push(format!("--max-offset={max_offset}"));
        }
        if let Some(mib) = self.max_sql_memory_mib {
            args.push(format!("--max-sql-memory={mib}MiB"));
        }
        args.push(format!("--pid-file={pid_file}"));
        args.push(format!("--port={port}"));
        args.push(format!("--store={store_arg}"));

        Ok(CockroachStarter {
            log: self.log,
            executable,
            args,
            temp_dir,
            store_dir,
            pid_file,
            url_file,
            host: self.host,
            port,
            readiness: self.readiness,
            keep_data_dir: self.keep_data_dir,
            startup_timeout: self.startup_timeout,
            shutdown_timeout: self.shutdown_timeout,
            poll_interval: self.poll_interval,
            stdout: self.stdout,
            stderr: self.stderr,
            on_ready: self.on_ready,
        })
    }
}

/// A fully configured, not-yet-started database instance.
pub struct CockroachStarter {
    log: Logger,
    executable: Utf8PathBuf,
    args: Vec<String>,
    temp_dir: Utf8TempDir,
    store_dir: Option<Utf8PathBuf>,
    pid_file: Utf8PathBuf,
    url_file: Utf8PathBuf,
    host: String,
    port: u16,
    readiness: Readiness,
    keep_data_dir: bool,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
    poll_interval: Duration,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    on_ready: Option<ReadyHook>,
}

impl CockroachStarter {
    /// Returns the instance's private temporary directory.
    pub fn temp_dir(&self) -> &Utf8Path {
        self.temp_dir.path()
    }

    /// Returns the directory the database stores data in, unless it uses an
    /// in-memory store.
    pub fn store_dir(&self) -> Option<&Utf8Path> {
        self.store_dir.as_deref()
    }

    /// Returns the command line that will be (or was) executed.
    pub fn cmdline(&self) -> String {
        format!("{} {}", self.executable, self.args.join(" "))
    }

    /// Starts the database and waits for it to accept connections.
    ///
    /// On readiness timeout the child process is left running and the
    /// temporary directory is left in place, since diagnosing a failed boot
    /// usually requires the partially-started server's files.
    pub async fn start(mut self) -> Result<CockroachInstance, StartError> {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(if self.stdout.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if self.stderr.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = cmd.spawn().map_err(|err| StartError::Spawn {
            cmd: self.cmdline(),
            err,
        })?;

        if let (Some(sink), Some(stdout)) =
            (self.stdout.take(), child.stdout.take())
        {
            spawn_reader(stdout, sink);
        }
        if let (Some(sink), Some(stderr)) =
            (self.stderr.take(), child.stderr.take())
        {
            spawn_reader(stderr, sink);
        }

        let poll = ReadinessPoll {
            interval: self.poll_interval,
            ceiling: self.startup_timeout,
        };
        let details = match self.readiness {
            Readiness::Files => {
                poll.wait_for_files(&mut child, &self.pid_file, &self.url_file)
                    .await
            }
            Readiness::Port => {
                poll.wait_for_port(&mut child, &self.host, self.port).await
            }
        };
        let details = match details {
            Ok(details) => details,
            Err(error) => {
                // Keep the directory (pid file, logs, store) around for
                // whoever has to figure out what went wrong.
                let kept = self.temp_dir.keep();
                warn!(
                    self.log, "database failed to start; leaving state for inspection";
                    "dir" => %kept,
                );
                return Err(error);
            }
        };

        let mut context = Context::new();
        if let Some(hook) = self.on_ready.take() {
            hook(&details, &mut context);
        }
        info!(
            self.log, "database ready";
            "pid" => details.pid, "url" => %details.url,
        );

        Ok(CockroachInstance {
            log: self.log,
            temp_path: self.temp_dir.path().to_owned(),
            args: self.args,
            executable: self.executable,
            details,
            child: Some(child),
            temp_dir: Some(self.temp_dir),
            keep_data_dir: self.keep_data_dir,
            shutdown_timeout: self.shutdown_timeout,
            context,
        })
    }
}

/// A running database instance.
pub struct CockroachInstance {
    log: Logger,
    temp_path: Utf8PathBuf,
    executable: Utf8PathBuf,
    args: Vec<String>,
    details: ProcessDetails,
    child: Option<tokio::process::Child>,
    temp_dir: Option<Utf8TempDir>,
    keep_data_dir: bool,
    shutdown_timeout: Duration,
    context: Context,
}

impl CockroachInstance {
    /// Returns the pid of the database process.
    pub fn pid(&self) -> u32 {
        self.details.pid
    }

    /// Returns the connection URL reported by the server.
    pub fn url(&self) -> &str {
        &self.details.url
    }

    pub fn details(&self) -> &ProcessDetails {
        &self.details
    }

    /// Returns the instance's private temporary directory.
    pub fn temp_dir(&self) -> &Utf8Path {
        &self.temp_path
    }

    /// Returns the command line the database was started with.
    pub fn cmdline(&self) -> String {
        format!("{} {}", self.executable, self.args.join(" "))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Waits for the database process to exit on its own.  This is for
    /// tools that want to notice an unexpected shutdown; tests normally go
    /// straight to [`Self::cleanup`].
    pub async fn wait_for_shutdown(&mut self) -> Result<ExitStatus, CleanupError> {
        let pid = self.details.pid;
        match self.child.as_mut() {
            Some(child) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|err| CleanupError::Wait { pid, err })?;
                let _ = self.child.take();
                Ok(status)
            }
            None => Err(CleanupError::InvalidState),
        }
    }

    /// Kills the database process and removes its temporary directory.
    ///
    /// Allowed exactly once; a second call is a fixture-misuse bug and
    /// fails with [`CleanupError::InvalidState`].  Directory removal is
    /// best-effort and never masks a termination failure.
    pub async fn cleanup(&mut self) -> Result<(), CleanupError> {
        let child = self.child.take();
        let dir = self.temp_dir.take();
        if child.is_none() && dir.is_none() {
            return Err(CleanupError::InvalidState);
        }

        let pid = self.details.pid;
        let kill_result = match child {
            Some(mut child) => {
                match child.start_kill() {
                    Ok(()) => {
                        match timeout(self.shutdown_timeout, child.wait()).await
                        {
                            Err(_) => Err(CleanupError::ShutdownTimeout {
                                pid,
                                waited: self.shutdown_timeout,
                            }),
                            Ok(Err(err)) => {
                                Err(CleanupError::Wait { pid, err })
                            }
                            Ok(Ok(_)) => Ok(()),
                        }
                    }
                    Err(err) => Err(CleanupError::Kill { pid, err }),
                }
            }
            None => Ok(()),
        };

        if let Some(dir) = dir {
            if self.keep_data_dir {
                let kept = dir.keep();
                info!(self.log, "keeping database directory"; "dir" => %kept);
            } else {
                scrub_dir(&self.log, dir);
            }
        }
        kill_result
    }
}

impl std::fmt::Debug for CockroachInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CockroachInstance")
            .field("details", &self.details)
            .field("temp_dir", &self.temp_path)
            .finish()
    }
}

impl Drop for CockroachInstance {
    fn drop(&mut self) {
        if self.child.is_some() || self.temp_dir.is_some() {
            eprintln!(
                "WARN: dropped CockroachInstance without cleaning it up first \
                 (there may still be a child process running (PID {}) and a \
                 temporary directory leaked ({}))",
                self.details.pid, self.temp_path,
            );
            if let Some(child) = self.child.as_mut() {
                let _ = child.start_kill();
            }
            if let Some(dir) = self.temp_dir.take() {
                if self.keep_data_dir {
                    let _ = dir.keep();
                }
                // Otherwise the TempDir's own Drop makes a best-effort
                // attempt at removal.
            }
        }
    }
}

// Deletes everything under (and including) the temp dir, leaf-first.
// Individual failures are logged and skipped; a litter-free exit is worth
// more to a test run than an error here.
fn scrub_dir(log: &Logger, dir: Utf8TempDir) {
    // Take over deletion from the TempDir so failures are visible.
    let root = dir.keep();
    for entry in walkdir::WalkDir::new(&root).contents_first(true) {
        match entry {
            Ok(entry) => {
                let result = if entry.file_type().is_dir() {
                    std::fs::remove_dir(entry.path())
                } else {
                    std::fs::remove_file(entry.path())
                };
                if let Err(err) = result {
                    warn!(
                        log, "failed to remove {:?}: {}", entry.path(), err,
                    );
                }
            }
            Err(err) => warn!(log, "failed to walk database dir: {}", err),
        }
    }
}

struct ReadinessPoll {
    interval: Duration,
    ceiling: Duration,
}

impl ReadinessPoll {
    /// File-signal readiness: wait for the pid and listen-URL files, then
    /// confirm with a TCP connect to the advertised address.
    async fn wait_for_files(
        &self,
        child: &mut tokio::process::Child,
        pid_file: &Utf8Path,
        url_file: &Utf8Path,
    ) -> Result<ProcessDetails, StartError> {
        let start = Instant::now();
        let mut pid: Option<u32> = None;
        let mut addr: Option<(String, u16, String)> = None;
        loop {
            if let Some(status) =
                child.try_wait().map_err(StartError::Wait)?
            {
                return Err(StartError::Exited { status });
            }

            if pid.is_none() {
                if let Some(contents) = read_if_nonempty(pid_file).await {
                    pid = parse_pid(&contents);
                }
            }
            if addr.is_none() {
                if let Some(contents) = read_if_nonempty(url_file).await {
                    // The file can be mid-write; only a complete
                    // postgres line counts.
                    if let Some(url) = find_listen_url(&contents) {
                        let (host, port) = parse_listen_url(url)?;
                        addr = Some((host, port, url.to_string()));
                    }
                }
            }
            if let (Some(pid), Some((host, port, url))) = (pid, &addr) {
                if tcp_probe(host, *port).await {
                    return Ok(ProcessDetails {
                        pid,
                        host: host.clone(),
                        port: *port,
                        url: url.clone(),
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed > self.ceiling {
                return Err(StartError::TimedOut {
                    elapsed,
                    pid,
                    addr: addr.map(|(host, port, _)| (host, port)),
                });
            }
            sleep(self.interval).await;
        }
    }

    /// Port-probe readiness: the address was chosen before launch, so just
    /// retry a TCP connect until it succeeds.
    async fn wait_for_port(
        &self,
        child: &mut tokio::process::Child,
        host: &str,
        port: u16,
    ) -> Result<ProcessDetails, StartError> {
        let start = Instant::now();
        loop {
            if let Some(status) =
                child.try_wait().map_err(StartError::Wait)?
            {
                return Err(StartError::Exited { status });
            }
            if tcp_probe(host, port).await {
                return Ok(ProcessDetails {
                    pid: child.id().unwrap_or(0),
                    host: host.to_string(),
                    port,
                    url: format!(
                        "postgresql://root@{host}:{port}?sslmode=disable"
                    ),
                });
            }
            let elapsed = start.elapsed();
            if elapsed > self.ceiling {
                return Err(StartError::TimedOut {
                    elapsed,
                    pid: child.id(),
                    addr: Some((host.to_string(), port)),
                });
            }
            sleep(self.interval).await;
        }
    }
}

async fn tcp_probe(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).await.is_ok()
}

// Returns the file's contents if it exists and has any.
async fn read_if_nonempty(path: &Utf8Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if !contents.is_empty() => Some(contents),
        _ => None,
    }
}

// First line that is entirely a number, i.e. the server's pid.
fn parse_pid(contents: &str) -> Option<u32> {
    contents.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        line.parse().ok()
    })
}

// First line that looks like a postgres connection URL.
fn find_listen_url(contents: &str) -> Option<&str> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| line.to_ascii_lowercase().starts_with("postgres"))
}

/// Parses host and port out of a URL of the form
/// `scheme://[user@]host:port[/path]`, dropping any user component.
fn parse_listen_url(url: &str) -> Result<(String, u16), StartError> {
    let invalid = || StartError::InvalidUrl { url: url.to_string() };
    let (_, rest) = url.split_once("://").ok_or_else(invalid)?;
    let authority =
        rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = match authority.rsplit_once('@') {
        Some((_, host_port)) => host_port,
        None => authority,
    };
    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

// Forwards each line of `reader` to `sink`, prefixed with the fixed output
// tag.  The task exits silently when the stream closes or either side
// errors; a drained pipe is a convenience, not correctness.  Draining does
// matter, though: a child blocked on a full pipe buffer never gets to
// readiness.
fn spawn_reader(
    reader: impl AsyncRead + Send + Unpin + 'static,
    mut sink: OutputSink,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = OUTPUT_PREFIX.as_bytes().to_vec();
    let prefix_len = buf.len();
    // Nothing joins these tasks; they live until their stream closes.
    let _ = tokio::spawn(async move {
        loop {
            buf.truncate(prefix_len);
            // The child's output is not guaranteed to be UTF-8; carry raw
            // bytes through to each newline.
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => (),
            }
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            if sink.write_all(&buf).await.is_err() {
                return;
            }
        }
    });
}
