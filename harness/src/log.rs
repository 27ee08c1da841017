// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terminal logger construction.
//!
//! The library itself only consumes a [`slog::Logger`] handed in by the
//! caller; these helpers exist for binaries and tests that need a drain
//! without pulling in a larger framework.

use slog::{Drain, Level, Logger};

/// Creates a logger that writes human-readable output to stderr.
pub fn stderr_logger(name: &str, level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!("name" => name.to_string()))
}
