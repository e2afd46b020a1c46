//! Filesystem root resolution.
//!
//! Decides whether the scanner and the streaming responder operate
//! against a local directory or an SMB share mounted at a fixed mount
//! point. Mounting is a best-effort optimization: every failure along
//! the pipeline logs a remediation message and falls back to the local
//! directory, which is created when missing.

mod command;

pub use command::{CommandOutput, CommandRunner, CommandSpec, MountStrategy, SystemRunner};

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("invalid share descriptor `{0}`: not a URL")]
    InvalidDescriptor(String),

    #[error("invalid share protocol `{0}`: must be smb://")]
    InvalidScheme(String),

    #[error("share descriptor has no host")]
    MissingHost,

    #[error("Rosetta 2 is not installed")]
    RosettaMissing,

    #[error("mount command failed: {0}")]
    CommandFailed(String),

    #[error("mount point {0} is not accessible after mounting")]
    MountPointInaccessible(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Credentials for the remote share; guest access when absent.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// A parsed `smb://host/share/path` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbShare {
    pub host: String,
    pub share_path: String,
}

impl SmbShare {
    pub fn parse(descriptor: &str) -> Result<Self, MountError> {
        let url = Url::parse(descriptor)
            .map_err(|_| MountError::InvalidDescriptor(descriptor.to_string()))?;
        if url.scheme() != "smb" {
            return Err(MountError::InvalidScheme(url.scheme().to_string()));
        }
        let host = url.host().ok_or(MountError::MissingHost)?;
        let host_is_ip = matches!(host, Host::Ipv4(_) | Host::Ipv6(_));
        let share = Self {
            host: host.to_string(),
            share_path: url.path().trim_start_matches('/').to_string(),
        };
        debug!(host = %share.host, ip_literal = host_is_ip, "parsed share descriptor");
        Ok(share)
    }

    /// DNS resolution is pointless for literal addresses.
    pub fn host_is_ip(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }
}

/// Shared handle to the directory all relative paths resolve against.
/// Swapped atomically whenever the resolver re-runs.
#[derive(Debug, Clone)]
pub struct EffectiveRoot(Arc<RwLock<PathBuf>>);

impl EffectiveRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(Arc::new(RwLock::new(path)))
    }

    pub fn get(&self) -> PathBuf {
        self.0.read().clone()
    }

    fn set(&self, path: PathBuf) {
        *self.0.write() = path;
    }
}

/// Owns the mount lifecycle and the local-directory fallback policy.
pub struct RootResolver {
    share_descriptor: Option<String>,
    mount_point: PathBuf,
    fallback_dir: PathBuf,
    strategy: MountStrategy,
    runner: Arc<dyn CommandRunner>,
    credentials: RwLock<Option<Credentials>>,
    effective: EffectiveRoot,
}

impl RootResolver {
    pub fn new(
        share_descriptor: Option<String>,
        mount_point: PathBuf,
        fallback_dir: PathBuf,
        credentials: Option<Credentials>,
        strategy: MountStrategy,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let effective = EffectiveRoot::new(fallback_dir.clone());
        Self {
            share_descriptor,
            mount_point,
            fallback_dir,
            strategy,
            runner,
            credentials: RwLock::new(credentials),
            effective,
        }
    }

    /// Handle to the currently effective root. The handle stays valid
    /// across re-resolutions; only the path inside it changes.
    pub fn effective_root(&self) -> EffectiveRoot {
        self.effective.clone()
    }

    /// Establish the effective root: mount the share when one is
    /// configured, otherwise (or on any mount failure) use the local
    /// fallback directory. Never fails.
    pub async fn resolve(&self) -> PathBuf {
        let root = match &self.share_descriptor {
            None => {
                info!("no share descriptor configured, using local media directory");
                self.fallback().await
            }
            Some(descriptor) => match self.mount_share(descriptor).await {
                Ok(()) => {
                    info!(mount_point = %self.mount_point.display(), "SMB share mounted");
                    self.mount_point.clone()
                }
                Err(e) => {
                    self.log_remediation(descriptor, &e);
                    self.fallback().await
                }
            },
        };

        self.effective.set(root.clone());
        root
    }

    /// Store new credentials and re-run the mount pipeline. The caller
    /// is responsible for invalidating the index cache afterwards.
    pub async fn set_credentials(&self, credentials: Credentials) -> PathBuf {
        *self.credentials.write() = Some(credentials);
        self.resolve().await
    }

    async fn fallback(&self) -> PathBuf {
        match tokio::fs::metadata(&self.fallback_dir).await {
            Ok(_) => {
                info!(dir = %self.fallback_dir.display(), "using local media directory");
            }
            Err(_) => {
                warn!(dir = %self.fallback_dir.display(), "media directory missing, creating it");
                if let Err(e) = tokio::fs::create_dir_all(&self.fallback_dir).await {
                    error!(dir = %self.fallback_dir.display(), error = %e, "failed to create media directory");
                }
            }
        }
        self.fallback_dir.clone()
    }

    async fn mount_share(&self, descriptor: &str) -> Result<(), MountError> {
        let share = SmbShare::parse(descriptor)?;
        tokio::fs::create_dir_all(&self.mount_point).await?;

        self.preflight(&share).await?;

        // Clear any stale mount first; "nothing to unmount" is expected.
        let unmount = self.strategy.unmount_command(&self.mount_point);
        match self.runner.run(&unmount).await {
            Ok(output) if !output.success => debug!("no previous mount to clean up"),
            Ok(_) => debug!("unmounted stale mount"),
            Err(e) => debug!(error = %e, "unmount attempt failed, continuing"),
        }

        let credentials = self.credentials.read().clone();
        let mount = self
            .strategy
            .mount_command(&share, credentials.as_ref(), &self.mount_point);
        info!(
            host = %share.host,
            share = %share.share_path,
            mount_point = %self.mount_point.display(),
            guest = credentials.is_none(),
            "mounting SMB share"
        );

        let output = self.runner.run(&mount).await?;
        if !output.success {
            return Err(MountError::CommandFailed(output.stderr.trim().to_string()));
        }
        if !output.stderr.trim().is_empty() {
            warn!(stderr = %output.stderr.trim(), "mount command reported warnings");
        }

        tokio::fs::metadata(&self.mount_point)
            .await
            .map_err(|_| MountError::MountPointInaccessible(self.mount_point.clone()))?;

        // Read-only shares are usable; only warn.
        let probe = self.mount_point.join(".write_test");
        match tokio::fs::write(&probe, b"test").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe).await;
                debug!("share is writable");
            }
            Err(e) => {
                warn!(error = %e, "share mounted but may be read-only");
            }
        }

        Ok(())
    }

    /// Pre-flight diagnostics. Every failed check logs a remedial
    /// message; only a missing compatibility layer is a hard
    /// prerequisite that aborts the attempt.
    async fn preflight(&self, share: &SmbShare) -> Result<(), MountError> {
        if self.strategy.requires_rosetta() {
            let probe = self.strategy.rosetta_probe_command();
            let ok = matches!(self.runner.run(&probe).await, Ok(output) if output.success);
            if !ok {
                error!(
                    "Rosetta 2 is required to run mount_smbfs on Apple Silicon; \
                     install it with: sudo softwareupdate --install-rosetta"
                );
                return Err(MountError::RosettaMissing);
            }
        }

        let ping = self.strategy.ping_command(&share.host);
        if !self.check(&ping).await {
            warn!(
                host = %share.host,
                "host did not answer ping; verify network connectivity before the mount attempt"
            );
        }

        if share.host_is_ip() {
            debug!("IP address detected, skipping DNS resolution check");
        } else {
            let dns = self.strategy.dns_command(&share.host);
            if !self.check(&dns).await {
                warn!(
                    host = %share.host,
                    "DNS resolution failed; check your DNS configuration"
                );
            }
        }

        let port = self.strategy.smb_port_command(&share.host);
        if !self.check(&port).await {
            warn!(
                host = %share.host,
                "SMB service not reachable on port 445; verify the server is running and the port is not blocked"
            );
        }

        if self.strategy.is_macos() {
            let diagnostics = self.strategy.smb_diagnostics_command(&share.host);
            if !self.check(&diagnostics).await {
                warn!(
                    host = %share.host,
                    "smbutil could not enumerate shares; the server may reject guest access or the share name may be wrong"
                );
            }
        }

        Ok(())
    }

    async fn check(&self, spec: &CommandSpec) -> bool {
        match self.runner.run(spec).await {
            Ok(output) => output.success,
            Err(e) => {
                debug!(command = %spec, error = %e, "pre-flight command could not be executed");
                false
            }
        }
    }

    fn log_remediation(&self, descriptor: &str, err: &MountError) {
        if self.strategy.is_macos() {
            error!(
                error = %err,
                "failed to mount {descriptor}; check that the share is reachable \
                 (nc -z -w 3 <host> 445), that credentials are correct, that DNS \
                 resolves the host, and that you can connect via Finder > Go > \
                 Connect to Server. On Apple Silicon, Rosetta 2 must be installed. \
                 Falling back to the local media directory"
            );
        } else {
            error!(
                error = %err,
                "failed to mount {descriptor}; check that cifs-utils is installed \
                 (apt-get install cifs-utils), that you have mount permissions, \
                 that the share is reachable (nc -z -w 3 <host> 445), and that \
                 credentials are correct (smbclient -L <host>). Falling back to \
                 the local media directory"
            );
        }
    }
}

impl std::fmt::Debug for RootResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootResolver")
            .field("share_descriptor", &self.share_descriptor)
            .field("mount_point", &self.mount_point)
            .field("fallback_dir", &self.fallback_dir)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every command and fails the programs it is told to fail.
    #[derive(Default)]
    struct FakeRunner {
        fail_programs: Vec<String>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        fn failing<const N: usize>(programs: [&str; N]) -> Self {
            Self {
                fail_programs: programs.map(str::to_string).to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn programs_run(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|spec| spec.program.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            let success = !self.fail_programs.contains(&spec.program);
            Ok(CommandOutput {
                success,
                stdout: String::new(),
                stderr: if success { String::new() } else { "boom".into() },
            })
        }
    }

    fn resolver(
        share: Option<&str>,
        temp: &TempDir,
        strategy: MountStrategy,
        runner: Arc<FakeRunner>,
    ) -> RootResolver {
        RootResolver::new(
            share.map(str::to_string),
            temp.path().join("mnt"),
            temp.path().join("media"),
            None,
            strategy,
            runner,
        )
    }

    #[test]
    fn test_parse_share_descriptor() {
        let share = SmbShare::parse("smb://192.168.1.5/UGH-SHARE-TWO/Media").unwrap();
        assert_eq!(share.host, "192.168.1.5");
        assert_eq!(share.share_path, "UGH-SHARE-TWO/Media");
        assert!(share.host_is_ip());

        let named = SmbShare::parse("smb://nas.local/Media").unwrap();
        assert!(!named.host_is_ip());

        assert!(matches!(
            SmbShare::parse("nfs://server/share"),
            Err(MountError::InvalidScheme(_))
        ));
        assert!(matches!(
            SmbShare::parse("not a url"),
            Err(MountError::InvalidDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn test_no_share_uses_and_creates_fallback() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(None, &temp, MountStrategy::LinuxX86_64, runner.clone());

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("media"));
        assert!(root.is_dir());
        assert!(runner.programs_run().is_empty());
        assert_eq!(resolver.effective_root().get(), root);
    }

    #[tokio::test]
    async fn test_successful_mount_uses_mount_point() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::LinuxX86_64,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("mnt"));

        let programs = runner.programs_run();
        assert_eq!(programs, vec!["ping", "nc", "umount", "mount"]);
    }

    #[tokio::test]
    async fn test_dns_checked_only_for_named_hosts() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(
            Some("smb://nas.local/Media"),
            &temp,
            MountStrategy::LinuxX86_64,
            runner.clone(),
        );

        resolver.resolve().await;
        assert!(runner.programs_run().contains(&"nslookup".to_string()));
    }

    #[tokio::test]
    async fn test_mount_failure_falls_back_to_local_dir() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::failing(["mount"]));
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::LinuxX86_64,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("media"));
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_failed_preflight_checks_do_not_abort_mount() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::failing(["ping", "nc", "nslookup"]));
        let resolver = resolver(
            Some("smb://nas.local/Media"),
            &temp,
            MountStrategy::LinuxX86_64,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("mnt"));
        assert!(runner.programs_run().contains(&"mount".to_string()));
    }

    #[tokio::test]
    async fn test_macos_preflight_runs_share_diagnostics() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::MacosIntel,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("mnt"));

        let programs = runner.programs_run();
        assert_eq!(programs, vec!["ping", "nc", "smbutil", "umount", "mount_smbfs"]);
    }

    #[tokio::test]
    async fn test_share_diagnostics_failure_does_not_abort_mount() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::failing(["smbutil"]));
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::MacosIntel,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("mnt"));
        assert!(runner.programs_run().contains(&"mount_smbfs".to_string()));
    }

    #[tokio::test]
    async fn test_missing_rosetta_is_a_hard_prerequisite() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::failing(["arch"]));
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::MacosAppleSilicon,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("media"));

        let programs = runner.programs_run();
        assert_eq!(programs, vec!["arch"]);
    }

    #[tokio::test]
    async fn test_malformed_descriptor_falls_back_without_commands() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(
            Some("ftp://192.168.1.5/Media"),
            &temp,
            MountStrategy::LinuxX86_64,
            runner.clone(),
        );

        let root = resolver.resolve().await;
        assert_eq!(root, temp.path().join("media"));
        assert!(runner.programs_run().is_empty());
    }

    #[tokio::test]
    async fn test_set_credentials_re_resolves() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let resolver = resolver(
            Some("smb://192.168.1.5/Media"),
            &temp,
            MountStrategy::LinuxGeneric,
            runner.clone(),
        );

        resolver
            .set_credentials(Credentials {
                username: "alice".to_string(),
                password: "secret".to_string(),
                domain: None,
            })
            .await;

        let mounts: Vec<CommandSpec> = runner
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.program == "mount")
            .cloned()
            .collect();
        assert_eq!(mounts.len(), 1);
        assert!(mounts[0].args.last().unwrap().contains("username=alice"));
    }
}
