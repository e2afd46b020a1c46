//! External command boundary for mount, unmount, and pre-flight checks.
//!
//! Platform and CPU-architecture differences live in [`MountStrategy`];
//! everything the resolver executes goes through the narrow
//! [`CommandRunner`] trait so tests can substitute a recording fake.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use super::{Credentials, SmbShare};

/// An argv-style command description. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs commands via `tokio::process`.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One mount recipe per supported {OS, CPU architecture} combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStrategy {
    MacosIntel,
    MacosAppleSilicon,
    LinuxX86_64,
    LinuxGeneric,
}

impl MountStrategy {
    /// Pick the strategy for the host this process runs on.
    pub fn detect() -> Self {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => Self::MacosAppleSilicon,
            ("macos", _) => Self::MacosIntel,
            (_, "x86_64") => Self::LinuxX86_64,
            _ => Self::LinuxGeneric,
        }
    }

    pub fn is_macos(self) -> bool {
        matches!(self, Self::MacosIntel | Self::MacosAppleSilicon)
    }

    /// `mount_smbfs` ships as an x86_64 binary; on Apple Silicon it needs
    /// the Rosetta 2 translation layer as a hard prerequisite.
    pub fn requires_rosetta(self) -> bool {
        self == Self::MacosAppleSilicon
    }

    pub fn ping_command(self, host: &str) -> CommandSpec {
        if self.is_macos() {
            CommandSpec::new("ping", ["-c", "1", "-t", "3", host])
        } else {
            CommandSpec::new("ping", ["-c", "1", "-W", "3", host])
        }
    }

    pub fn dns_command(self, host: &str) -> CommandSpec {
        CommandSpec::new("nslookup", [host])
    }

    pub fn smb_port_command(self, host: &str) -> CommandSpec {
        CommandSpec::new("nc", ["-z", "-w", "3", host, "445"])
    }

    pub fn rosetta_probe_command(self) -> CommandSpec {
        CommandSpec::new("arch", ["-x86_64", "true"])
    }

    /// macOS-only: `smbutil statshares` enumerates the shares the server
    /// advertises, which tells apart "server unreachable" from "share
    /// missing or unauthorized" before a mount attempt.
    pub fn smb_diagnostics_command(self, host: &str) -> CommandSpec {
        CommandSpec::new(
            "smbutil",
            ["statshares".to_string(), "-a".to_string(), format!("guest@{host}")],
        )
    }

    pub fn unmount_command(self, mount_point: &Path) -> CommandSpec {
        let target = mount_point.display().to_string();
        if self.is_macos() {
            CommandSpec::new("umount", [target])
        } else {
            CommandSpec::new("umount", ["-f".to_string(), target])
        }
    }

    pub fn mount_command(
        self,
        share: &SmbShare,
        credentials: Option<&Credentials>,
        mount_point: &Path,
    ) -> CommandSpec {
        let target = mount_point.display().to_string();
        match self {
            Self::MacosIntel | Self::MacosAppleSilicon => {
                let options = "nobrowse,rw,nodev,nosuid";
                let source = match credentials {
                    Some(creds) => {
                        let user = match &creds.domain {
                            Some(domain) => format!("{domain};{}", creds.username),
                            None => creds.username.clone(),
                        };
                        format!(
                            "//{user}:{password}@{host}/{share}",
                            password = creds.password,
                            host = share.host,
                            share = share.share_path,
                        )
                    }
                    None => format!("//guest@{}/{}", share.host, share.share_path),
                };

                if self == Self::MacosAppleSilicon {
                    CommandSpec::new(
                        "arch",
                        [
                            "-x86_64",
                            "mount_smbfs",
                            "-o",
                            options,
                            source.as_str(),
                            target.as_str(),
                        ],
                    )
                } else {
                    CommandSpec::new(
                        "mount_smbfs",
                        ["-o", options, source.as_str(), target.as_str()],
                    )
                }
            }
            Self::LinuxX86_64 | Self::LinuxGeneric => {
                let mut options: Vec<String> = Vec::new();
                match credentials {
                    Some(creds) => {
                        options.push(format!("username={}", creds.username));
                        if !creds.password.is_empty() {
                            options.push(format!("password={}", creds.password));
                        }
                        if let Some(domain) = &creds.domain {
                            options.push(format!("domain={domain}"));
                        }
                    }
                    None => options.push("guest".to_string()),
                }

                // SMB3 on modern systems, SMB2.1 elsewhere for
                // compatibility with older NAS firmware.
                if self == Self::LinuxX86_64 {
                    options.push("vers=3.0".to_string());
                    options.push("sec=ntlmssp".to_string());
                } else {
                    options.push("vers=2.1".to_string());
                }
                options.extend(
                    ["rw", "iocharset=utf8", "file_mode=0777", "dir_mode=0777"]
                        .map(str::to_string),
                );

                CommandSpec::new(
                    "mount",
                    [
                        "-t".to_string(),
                        "cifs".to_string(),
                        format!("//{}/{}", share.host, share.share_path),
                        target,
                        "-o".to_string(),
                        options.join(","),
                    ],
                )
            }
        }
    }
}
