// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use crdb_harness::db::{CockroachStarterBuilder, DEFAULT_VERSION};
use futures::StreamExt;
use libc::SIGINT;
use signal_hook_tokio::Signals;
use slog::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CrdbDevApp::parse();
    args.exec().await
}

/// Tools for working with a local CockroachDB development server.
#[derive(Clone, Debug, Parser)]
#[clap(version)]
struct CrdbDevApp {
    #[clap(subcommand)]
    command: CrdbDevCmd,
}

impl CrdbDevApp {
    async fn exec(&self) -> Result<(), anyhow::Error> {
        match &self.command {
            CrdbDevCmd::Run(args) => args.exec().await,
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
enum CrdbDevCmd {
    /// Run a CockroachDB server until Ctrl-C
    Run(RunArgs),
}

#[derive(Clone, Debug, Args)]
struct RunArgs {
    /// The port on which the SQL server will listen (0 means any available
    /// port)
    #[clap(long, default_value_t = 0)]
    listen_port: u16,

    /// Use this CockroachDB executable instead of installing one
    #[clap(long)]
    executable: Option<Utf8PathBuf>,

    /// CockroachDB version to install when no executable is given
    #[clap(long, default_value = DEFAULT_VERSION)]
    install_version: String,

    /// Store data in this directory instead of the temporary directory
    #[clap(long)]
    store_dir: Option<Utf8PathBuf>,

    /// Leave the temporary directory in place on exit
    #[clap(long, action)]
    no_cleanup: bool,
}

impl RunArgs {
    async fn exec(&self) -> Result<(), anyhow::Error> {
        let log = crdb_harness::log::stderr_logger("crdb-dev", Level::Info);

        // Start a stream listening for SIGINT before launching anything.
        let signals =
            Signals::new([SIGINT]).context("failed to wait for SIGINT")?;
        let mut signal_stream = signals.fuse();

        let mut builder = CockroachStarterBuilder::new()
            .logger(log)
            .port(self.listen_port)
            .version(&self.install_version)
            .redirect_stdout()
            .redirect_stderr();
        if let Some(executable) = &self.executable {
            builder = builder.executable(executable);
        }
        if let Some(store_dir) = &self.store_dir {
            builder = builder.store_dir(store_dir);
        }
        if self.no_cleanup {
            builder = builder.keep_data_dir();
        }

        let starter =
            builder.build().await.context("failed to set up CockroachDB")?;
        println!("crdb-dev: temporary directory: {}", starter.temp_dir());
        println!("crdb-dev: running command: {}", starter.cmdline());

        let mut db =
            starter.start().await.context("failed to start CockroachDB")?;
        println!("crdb-dev: child process: pid {}", db.pid());
        println!("crdb-dev: CockroachDB listening at: {}", db.url());

        tokio::select! {
            res = db.wait_for_shutdown() => {
                let status = res.context("waiting for CockroachDB")?;
                db.cleanup()
                    .await
                    .context("cleaning up after unexpected shutdown")?;
                bail!("crdb-dev: CockroachDB shut down unexpectedly ({status})");
            }
            caught_signal = signal_stream.next() => {
                assert_eq!(caught_signal.unwrap(), SIGINT);
                eprintln!(
                    "crdb-dev: caught signal, shutting down and removing \
                     temporary directory"
                );
                db.cleanup().await.context("clean up after SIGINT")?;
            }
        }
        Ok(())
    }
}
