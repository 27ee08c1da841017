// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolving and installing the CockroachDB binary.
//!
//! The binary for a given (OS, version) pair is installed at most once, into
//! a cache directory shared by every harness on the machine.  Installation
//! is claimed by creating a `<name>.tmp` sibling with `O_EXCL`: exactly one
//! process streams and unpacks the download while any concurrent caller
//! waits (bounded) for the claim to disappear and then picks up the
//! finished file.  Once fully written the binary is immutable and reads of
//! it are lock-free.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use slog::{debug, info, Logger};
use thiserror::Error;

use crate::poll;
use crate::poll::CondCheckError;

/// How long a caller waits for a concurrent installer before giving up.
const CLAIM_WAIT: Duration = Duration::from_secs(30);

/// Interval between checks for a concurrent installer's claim file.
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Structurally invalid provisioning configuration.  Never retried, and
/// surfaced before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported operating system {0:?}")]
    UnsupportedOs(String),

    #[error("unsupported compression identifier {0:?}")]
    UnsupportedCompression(String),

    #[error("unsupported resource scheme in {0:?}")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no binary source configured for {os} {version}")]
    NoSource { os: OsKind, version: String },

    #[error("failed to download {url}")]
    Download {
        url: String,
        #[source]
        err: reqwest::Error,
    },

    #[error("archive for {dest} contained no file entry")]
    EmptyArchive { dest: Utf8PathBuf },

    #[error("failed to read zip archive for {dest}")]
    Zip {
        dest: Utf8PathBuf,
        #[source]
        err: zip::result::ZipError,
    },

    #[error("{message}")]
    Io {
        message: String,
        #[source]
        err: std::io::Error,
    },

    #[error("unpack task failed")]
    Join(#[from] tokio::task::JoinError),

    #[error(
        "timed out after {waited:?} waiting for a concurrent install \
         (claim file {claim} still present or binary never appeared)"
    )]
    ClaimTimeout { claim: Utf8PathBuf, waited: Duration },
}

fn io_err(message: impl ToString, err: std::io::Error) -> InstallError {
    InstallError::Io { message: message.to_string(), err }
}

/// Operating systems for which an upstream binary exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OsKind {
    Linux,
    Darwin,
    Windows,
}

impl OsKind {
    /// Returns the kind matching the running host.
    pub fn current() -> Result<OsKind, ConfigError> {
        std::env::consts::OS.parse()
    }

    fn as_str(&self) -> &'static str {
        match self {
            OsKind::Linux => "linux",
            OsKind::Darwin => "darwin",
            OsKind::Windows => "windows",
        }
    }
}

impl FromStr for OsKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<OsKind, ConfigError> {
        match s {
            "linux" => Ok(OsKind::Linux),
            // "macos" is what `std::env::consts::OS` reports.
            "darwin" | "macos" => Ok(OsKind::Darwin),
            "windows" => Ok(OsKind::Windows),
            other => Err(ConfigError::UnsupportedOs(other.to_string())),
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fetched resource is compressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    TarGzip,
    Zip,
}

impl Compression {
    /// Parses the identifiers used in source configuration: `""`, `"gz"`,
    /// `"tgz"`, or `"zip"`.
    pub fn from_identifier(s: &str) -> Result<Compression, ConfigError> {
        match s.trim() {
            "" => Ok(Compression::None),
            "gz" => Ok(Compression::Gzip),
            "tgz" => Ok(Compression::TarGzip),
            "zip" => Ok(Compression::Zip),
            other => Err(ConfigError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Where a binary comes from: a file already on this machine (e.g. one
/// bundled with a repo checkout) or a web URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    File(Utf8PathBuf),
    Web(String),
}

impl Source {
    /// Parses a locator with scheme `file`, `http`, or `https`.
    pub fn parse(locator: &str) -> Result<Source, ConfigError> {
        if let Some(path) = locator.strip_prefix("file://") {
            Ok(Source::File(Utf8PathBuf::from(path)))
        } else if locator.starts_with("http://")
            || locator.starts_with("https://")
        {
            Ok(Source::Web(locator.to_string()))
        } else {
            Err(ConfigError::UnsupportedScheme(locator.to_string()))
        }
    }
}

/// A [`Source`] plus the compression of the resource behind it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub source: Source,
    pub compression: Compression,
}

impl SourceSpec {
    pub fn new(locator: &str, compression: &str) -> Result<SourceSpec, ConfigError> {
        Ok(SourceSpec {
            source: Source::parse(locator)?,
            compression: Compression::from_identifier(compression)?,
        })
    }
}

#[derive(Clone, Debug, Default)]
struct CatalogEntry {
    bundled: Option<SourceSpec>,
    web: Option<SourceSpec>,
}

/// Binary sources for each supported (OS, version) pair.
///
/// The upstream release downloads are the default layer; callers add
/// overrides for specific pairs (say, a locally bundled archive for a
/// development build).  A bundled source always wins over a web source,
/// and the web is only consulted when no bundled source is configured.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    overrides: BTreeMap<(OsKind, String), CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Adds a bundled source for one (OS, version) pair.
    pub fn with_bundled(
        mut self,
        os: OsKind,
        version: &str,
        spec: SourceSpec,
    ) -> Catalog {
        self.entry(os, version).bundled = Some(spec);
        self
    }

    /// Adds a web source for one (OS, version) pair, replacing the upstream
    /// default.
    pub fn with_web(
        mut self,
        os: OsKind,
        version: &str,
        spec: SourceSpec,
    ) -> Catalog {
        self.entry(os, version).web = Some(spec);
        self
    }

    fn entry(&mut self, os: OsKind, version: &str) -> &mut CatalogEntry {
        self.overrides.entry((os, version.to_string())).or_default()
    }

    /// Returns the source to install from, or `None` if this catalog has
    /// neither an override nor an upstream default for the pair.
    fn lookup(&self, os: OsKind, version: &str) -> Option<SourceSpec> {
        let entry = self.overrides.get(&(os, version.to_string()));
        if let Some(spec) = entry.and_then(|e| e.bundled.clone()) {
            return Some(spec);
        }
        if let Some(spec) = entry.and_then(|e| e.web.clone()) {
            return Some(spec);
        }
        Some(upstream_release(os, version))
    }
}

/// The upstream release download for one (OS, version) pair.
fn upstream_release(os: OsKind, version: &str) -> SourceSpec {
    let (artifact, compression) = match os {
        OsKind::Linux => (format!("cockroach-{version}.linux-amd64.tgz"), Compression::TarGzip),
        OsKind::Darwin => (format!("cockroach-{version}.darwin-10.9-amd64.tgz"), Compression::TarGzip),
        OsKind::Windows => (format!("cockroach-{version}.windows-6.2-amd64.zip"), Compression::Zip),
    };
    SourceSpec {
        source: Source::Web(format!(
            "https://binaries.cockroachdb.com/{artifact}"
        )),
        compression,
    }
}

/// Name of the cached binary for one (OS, version) pair.
pub fn binary_name(os: OsKind, version: &str) -> String {
    format!("cockroach-{version}.{os}-amd64")
}

/// The shared on-disk cache for installed binaries.
///
/// If possible, use a per-user directory under the system temp dir to avoid
/// clashes on shared build machines.
pub fn default_cache_dir() -> Utf8PathBuf {
    let subdir = std::env::var("USER")
        .map(|user| format!("crdb-bin-{user}"))
        .unwrap_or_else(|_| String::from("crdb-bin"));
    Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .expect("system temp dir is not a UTF-8 path")
        .join(subdir)
}

/// Installs binaries into the shared cache.
pub struct Installer {
    log: Logger,
    catalog: Catalog,
    cache_dir: Utf8PathBuf,
    claim_wait: Duration,
    claim_poll_interval: Duration,
}

impl Installer {
    pub fn new(log: &Logger, catalog: Catalog) -> Installer {
        Installer {
            log: log.clone(),
            catalog,
            cache_dir: default_cache_dir(),
            claim_wait: CLAIM_WAIT,
            claim_poll_interval: CLAIM_POLL_INTERVAL,
        }
    }

    /// Overrides the cache directory.
    pub fn cache_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Installer {
        self.cache_dir = dir.into();
        self
    }

    /// Overrides how long to wait for a concurrent installer.
    pub fn claim_wait(mut self, wait: Duration) -> Installer {
        self.claim_wait = wait;
        self
    }

    /// Returns the path of a runnable binary for the given pair, installing
    /// it first if the cache does not already hold one.
    pub async fn resolve(
        &self,
        os: OsKind,
        version: &str,
    ) -> Result<Utf8PathBuf, InstallError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|err| {
            io_err(format!("failed to create cache dir {}", self.cache_dir), err)
        })?;
        let dest = self.cache_dir.join(binary_name(os, version));
        if dest.exists() {
            debug!(self.log, "using cached binary"; "path" => %dest);
            return Ok(dest);
        }
        let spec = self
            .catalog
            .lookup(os, version)
            .ok_or_else(|| InstallError::NoSource {
                os,
                version: version.to_string(),
            })?;
        self.install(&spec, &dest).await?;
        Ok(dest)
    }

    async fn install(
        &self,
        spec: &SourceSpec,
        dest: &Utf8Path,
    ) -> Result<(), InstallError> {
        let claim = claim_path(dest);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&claim)
        {
            Ok(_) => (),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return self.await_concurrent_install(dest, &claim).await;
            }
            Err(err) => {
                return Err(io_err(
                    format!("failed to create claim file {claim}"),
                    err,
                ));
            }
        }

        info!(
            self.log, "installing binary";
            "source" => ?spec.source, "dest" => %dest,
        );
        let result = self.fetch_and_unpack(spec, &claim, dest).await;
        if result.is_err() {
            // Never leave partial artifacts behind for the next caller to
            // mistake for a finished install.
            let _ = std::fs::remove_file(&claim);
            let _ = std::fs::remove_file(dest);
        }
        result
    }

    async fn fetch_and_unpack(
        &self,
        spec: &SourceSpec,
        claim: &Utf8Path,
        dest: &Utf8Path,
    ) -> Result<(), InstallError> {
        let bytes = match &spec.source {
            Source::File(path) => tokio::fs::read(path).await.map_err(|err| {
                io_err(format!("failed to read bundled source {path}"), err)
            })?,
            Source::Web(url) => {
                let response = reqwest::get(url)
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|err| InstallError::Download {
                        url: url.clone(),
                        err,
                    })?;
                response
                    .bytes()
                    .await
                    .map_err(|err| InstallError::Download {
                        url: url.clone(),
                        err,
                    })?
                    .to_vec()
            }
        };

        let compression = spec.compression;
        let claim = claim.to_owned();
        let dest = dest.to_owned();
        tokio::task::spawn_blocking(move || {
            unpack_binary(&bytes, compression, &claim, &dest)?;
            make_owner_executable(&claim)?;
            std::fs::rename(&claim, &dest).map_err(|err| {
                io_err(format!("failed to rename {claim} to {dest}"), err)
            })
        })
        .await?
    }

    async fn await_concurrent_install(
        &self,
        dest: &Utf8Path,
        claim: &Utf8Path,
    ) -> Result<(), InstallError> {
        debug!(
            self.log, "waiting for concurrent install";
            "claim" => %claim,
        );
        // A bounded wait for the claim to be released.  Whether or not that
        // happens in time, the final file is what decides the outcome.
        let _ = poll::wait_for_condition::<(), std::convert::Infallible, _, _>(
            || async move {
                if claim.exists() {
                    Err(CondCheckError::NotYet)
                } else {
                    Ok(())
                }
            },
            &self.claim_poll_interval,
            &self.claim_wait,
        )
        .await;
        if dest.exists() {
            info!(
                self.log, "binary installed by a concurrent caller";
                "path" => %dest,
            );
            Ok(())
        } else {
            Err(InstallError::ClaimTimeout {
                claim: claim.to_owned(),
                waited: self.claim_wait,
            })
        }
    }
}

fn claim_path(dest: &Utf8Path) -> Utf8PathBuf {
    let mut claim = dest.to_owned();
    claim.set_extension("tmp");
    claim
}

/// Writes the (decompressed) binary bytes into `into`.  For archive formats
/// the binary is the first non-directory entry.
fn unpack_binary(
    bytes: &[u8],
    compression: Compression,
    into: &Utf8Path,
    dest: &Utf8Path,
) -> Result<(), InstallError> {
    let mut out = std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(into)
        .map_err(|err| io_err(format!("failed to open {into}"), err))?;
    let unpack_io = |err| io_err(format!("failed to unpack into {into}"), err);
    match compression {
        Compression::None => {
            out.write_all(bytes).map_err(unpack_io)?;
        }
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(bytes);
            std::io::copy(&mut decoder, &mut out).map_err(unpack_io)?;
        }
        Compression::TarGzip => {
            let gzr = flate2::read::GzDecoder::new(bytes);
            let mut archive = tar::Archive::new(gzr);
            let mut found = false;
            for entry in archive.entries().map_err(unpack_io)? {
                let mut entry = entry.map_err(unpack_io)?;
                if entry.header().entry_type().is_dir() {
                    continue;
                }
                std::io::copy(&mut entry, &mut out).map_err(unpack_io)?;
                found = true;
                break;
            }
            if !found {
                return Err(InstallError::EmptyArchive { dest: dest.to_owned() });
            }
        }
        Compression::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|err| InstallError::Zip { dest: dest.to_owned(), err })?;
            let mut found = false;
            for index in 0..archive.len() {
                let mut file = archive.by_index(index).map_err(|err| {
                    InstallError::Zip { dest: dest.to_owned(), err }
                })?;
                if file.is_dir() {
                    continue;
                }
                std::io::copy(&mut file, &mut out).map_err(unpack_io)?;
                found = true;
                break;
            }
            if !found {
                return Err(InstallError::EmptyArchive { dest: dest.to_owned() });
            }
        }
    }
    Ok(())
}

/// Marks the installed binary read/write/executable for the owner only.
#[cfg(unix)]
fn make_owner_executable(path: &Utf8Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|err| {
            io_err(format!("failed to set permissions on {path}"), err)
        })
}

#[cfg(not(unix))]
fn make_owner_executable(_path: &Utf8Path) -> Result<(), InstallError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use slog::o;

    const BINARY: &[u8] = b"#!/bin/sh\nexit 0\n";

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn installer(catalog: Catalog, cache: &Utf8Path) -> Installer {
        Installer::new(&log(), catalog).cache_dir(cache)
    }

    fn gzip_bytes(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        );
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn tgz_bytes(bytes: &[u8]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        );
        let mut tar = tar::Builder::new(encoder);

        // A leading directory entry, as the upstream tarballs have.
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        tar.append_data(&mut dir, "cockroach-vtest.linux-amd64/", std::io::empty())
            .unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_size(bytes.len() as u64);
        file.set_mode(0o755);
        file.set_cksum();
        tar.append_data(
            &mut file,
            "cockroach-vtest.linux-amd64/cockroach",
            bytes,
        )
        .unwrap();
        tar.into_inner().unwrap().finish().unwrap()
    }

    fn file_catalog(
        dir: &Utf8Path,
        name: &str,
        contents: &[u8],
        compression: &str,
    ) -> Catalog {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        let spec =
            SourceSpec::new(&format!("file://{path}"), compression).unwrap();
        Catalog::new().with_bundled(OsKind::Linux, "vtest", spec)
    }

    #[test]
    fn parses_the_closed_sets() {
        assert_eq!("linux".parse::<OsKind>().unwrap(), OsKind::Linux);
        assert_eq!("darwin".parse::<OsKind>().unwrap(), OsKind::Darwin);
        assert!(matches!(
            "solaris".parse::<OsKind>(),
            Err(ConfigError::UnsupportedOs(_))
        ));

        assert_eq!(Compression::from_identifier("").unwrap(), Compression::None);
        assert_eq!(
            Compression::from_identifier("tgz").unwrap(),
            Compression::TarGzip
        );
        assert!(matches!(
            Compression::from_identifier("xz"),
            Err(ConfigError::UnsupportedCompression(_))
        ));

        assert_eq!(
            Source::parse("file:///tmp/cockroach.tgz").unwrap(),
            Source::File(Utf8PathBuf::from("/tmp/cockroach.tgz"))
        );
        assert!(matches!(
            Source::parse("https://binaries.cockroachdb.com/x.tgz").unwrap(),
            Source::Web(_)
        ));
        assert!(matches!(
            Source::parse("ftp://example.com/x.tgz"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn upstream_defaults_cover_every_os() {
        for os in [OsKind::Linux, OsKind::Darwin, OsKind::Windows] {
            let spec = Catalog::new().lookup(os, "v1.1.7").unwrap();
            let Source::Web(url) = spec.source else {
                panic!("expected a web source for {os}");
            };
            assert!(url.starts_with("https://binaries.cockroachdb.com/"));
            assert!(url.contains("v1.1.7"));
        }
    }

    #[tokio::test]
    async fn installs_raw_gzip_and_tgz_bundles() {
        for (contents, compression) in [
            (BINARY.to_vec(), ""),
            (gzip_bytes(BINARY), "gz"),
            (tgz_bytes(BINARY), "tgz"),
        ] {
            let src = Utf8TempDir::new().unwrap();
            let cache = Utf8TempDir::new().unwrap();
            let catalog =
                file_catalog(src.path(), "bundle", &contents, compression);
            let path = installer(catalog, cache.path())
                .resolve(OsKind::Linux, "vtest")
                .await
                .unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), BINARY);
            assert!(!claim_path(&path).exists());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installed_binary_is_owner_executable() {
        use std::os::unix::fs::PermissionsExt;
        let src = Utf8TempDir::new().unwrap();
        let cache = Utf8TempDir::new().unwrap();
        let catalog = file_catalog(src.path(), "bundle", BINARY, "");
        let path = installer(catalog, cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn second_install_is_a_no_op() {
        let src = Utf8TempDir::new().unwrap();
        let cache = Utf8TempDir::new().unwrap();
        let catalog = file_catalog(src.path(), "bundle", BINARY, "");
        let first = installer(catalog, cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await
            .unwrap();

        // An empty catalog can still resolve: the cached file wins before
        // any source is consulted.
        let second = installer(Catalog::new(), cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), BINARY);
    }

    #[tokio::test]
    async fn stuck_claim_times_out_instead_of_hanging() {
        let src = Utf8TempDir::new().unwrap();
        let cache = Utf8TempDir::new().unwrap();
        let catalog = file_catalog(src.path(), "bundle", BINARY, "");
        let dest = cache.path().join(binary_name(OsKind::Linux, "vtest"));
        std::fs::write(claim_path(&dest), b"").unwrap();

        let result = installer(catalog, cache.path())
            .claim_wait(Duration::from_millis(200))
            .resolve(OsKind::Linux, "vtest")
            .await;
        assert!(matches!(result, Err(InstallError::ClaimTimeout { .. })));
    }

    #[tokio::test]
    async fn waits_for_a_concurrent_installer_to_finish() {
        let src = Utf8TempDir::new().unwrap();
        let cache = Utf8TempDir::new().unwrap();
        let catalog = file_catalog(src.path(), "bundle", BINARY, "");
        let dest = cache.path().join(binary_name(OsKind::Linux, "vtest"));
        let claim = claim_path(&dest);
        std::fs::write(&claim, b"").unwrap();

        // Simulate the concurrent installer finishing shortly.
        let dest_ = dest.clone();
        let claim_ = claim.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(&dest_, BINARY).unwrap();
            std::fs::remove_file(&claim_).unwrap();
        });

        let path = installer(catalog, cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await
            .unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&path).unwrap(), BINARY);
    }

    #[tokio::test]
    async fn failed_install_leaves_no_partial_artifacts() {
        let src = Utf8TempDir::new().unwrap();
        let cache = Utf8TempDir::new().unwrap();
        // Claims to be a tarball but contains garbage.
        let catalog =
            file_catalog(src.path(), "bundle", b"not a tarball", "tgz");
        let result = installer(catalog, cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await;
        assert!(result.is_err());
        let dest = cache.path().join(binary_name(OsKind::Linux, "vtest"));
        assert!(!dest.exists());
        assert!(!claim_path(&dest).exists());
    }

    #[tokio::test]
    async fn missing_bundled_source_fails() {
        let cache = Utf8TempDir::new().unwrap();
        let spec = SourceSpec::new("file:///nonexistent/bundle", "").unwrap();
        let catalog = Catalog::new().with_bundled(OsKind::Linux, "vtest", spec);
        let result = installer(catalog, cache.path())
            .resolve(OsKind::Linux, "vtest")
            .await;
        assert!(matches!(result, Err(InstallError::Io { .. })));
    }
}
