// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run a real CockroachDB server inside tests and development tools.
//!
//! The harness resolves a runnable binary (installing one into a shared
//! cache if necessary), launches it with a rendered flag set, polls until
//! the database is actually accepting TCP connections, and hands back the
//! connection details.  Tearing the instance down kills the process and
//! removes its temporary state.
//!
//! ```no_run
//! use crdb_harness::db::CockroachStarterBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let starter = CockroachStarterBuilder::new().build().await?;
//! let mut db = starter.start().await?;
//! println!("database listening at {}", db.url());
//! // ... connect with any postgres client and run the test workload ...
//! db.cleanup().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Connecting to the database is out of scope on purpose: callers bring
//! their own client library and use the `(host, port, url, pid)` from
//! [`db::ProcessDetails`].

pub mod context;
pub mod db;
pub mod install;
pub mod log;
pub mod poll;
pub mod port;

/// Returns whether the given process is currently running.
#[cfg(unix)]
pub fn process_running(pid: u32) -> bool {
    // It should be okay to invoke this syscall with these arguments.  This
    // only checks whether the process is running.
    0 == (unsafe { libc::kill(pid as libc::pid_t, 0) })
}
