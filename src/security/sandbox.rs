//! Sandbox profiles and their translation into host isolation invocations.
//!
//! A [`SandboxProfile`] describes filesystem and network restrictions for an
//! agent. Shell-executing tools hand their command string to
//! [`wrap_command`], which rewrites it into a host-native invocation:
//! `sandbox-exec` with a generated policy string on macOS, a `bwrap` flag
//! list on Linux, and a plain `/bin/sh -c` pass-through when sandboxing is
//! disabled or the host is unsupported.
//!
//! Every profile denies read access to well-known secret directories; this
//! is enforced in the constructors, not left to callers.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Directories no agent may ever read, regardless of profile.
const SECRET_PATHS: &[&str] = &[
    "~/.ssh",
    "~/.aws",
    "~/.config/gcloud",
    "~/.kube",
    "~/.gnupg",
];

// ─── Profiles ──────────────────────────────────────────────────────────────

/// Filesystem restrictions, expressed as path globs.
///
/// `deny_write` wins over `allow_write`; `deny_write = ["*"]` makes the
/// profile read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FsProfile {
    pub deny_read: Vec<String>,
    pub allow_write: Vec<String>,
    pub deny_write: Vec<String>,
}

/// Network restrictions. `["*"]` means unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetProfile {
    pub allowed_domains: Vec<String>,
}

impl NetProfile {
    pub fn unrestricted() -> Self {
        Self {
            allowed_domains: vec!["*".to_string()],
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed_domains.iter().any(|d| d == "*")
    }

    /// Whether a domain may be contacted under this profile.
    pub fn allows_domain(&self, domain: &str) -> bool {
        self.allowed_domains.iter().any(|allowed| {
            allowed == "*"
                || allowed == domain
                || (allowed.starts_with("*.")
                    && domain.ends_with(allowed.trim_start_matches('*')))
        })
    }
}

/// Per-agent filesystem + network restriction descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxProfile {
    pub fs: FsProfile,
    pub net: NetProfile,
}

impl SandboxProfile {
    /// Read-only everywhere, no network.
    pub fn read_only() -> Self {
        Self {
            fs: FsProfile {
                deny_read: secret_path_globs(),
                allow_write: Vec::new(),
                deny_write: vec!["*".to_string()],
            },
            net: NetProfile::default(),
        }
    }

    /// Writable inside the given workspace, read-only elsewhere, no network.
    pub fn workspace_write(workspace: &Path) -> Self {
        Self {
            fs: FsProfile {
                deny_read: secret_path_globs(),
                allow_write: vec![workspace.to_string_lossy().into_owned()],
                deny_write: Vec::new(),
            },
            net: NetProfile::default(),
        }
    }

    /// Grant network access to the given domains (`["*"]` for unrestricted).
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.net.allowed_domains = domains;
        self
    }

    /// Whether the profile forbids any write at all.
    pub fn is_read_only(&self) -> bool {
        self.fs.deny_write.iter().any(|g| g == "*")
    }

    /// Whether reading `path` is permitted.
    pub fn allows_read(&self, path: &Path) -> bool {
        let expanded = path.to_string_lossy();
        !self.fs.deny_read.iter().any(|g| glob_matches(g, &expanded))
    }

    /// Whether writing `path` is permitted. Deny globs win over allow globs;
    /// with no allow globs, anything not denied is writable.
    pub fn allows_write(&self, path: &Path) -> bool {
        let expanded = path.to_string_lossy();
        if self.fs.deny_write.iter().any(|g| glob_matches(g, &expanded)) {
            return false;
        }
        if self.fs.allow_write.is_empty() {
            return true;
        }
        self.fs.allow_write.iter().any(|g| glob_matches(g, &expanded))
    }
}

fn secret_path_globs() -> Vec<String> {
    SECRET_PATHS.iter().map(|p| format!("{p}/*")).collect()
}

/// Match a path against a glob, expanding a leading `~` and treating `*` as
/// "any sequence". `"*"` alone matches everything. A glob naming a plain
/// path (no wildcard) matches that path and everything under it, subpath
/// style; `dir/*` also covers `dir` itself.
fn glob_matches(glob: &str, path: &str) -> bool {
    if glob == "*" {
        return true;
    }
    let expanded = expand_home(glob);
    if let Some(prefix) = expanded.strip_suffix("/*")
        && (path == prefix || path.starts_with(&format!("{prefix}/")))
    {
        return true;
    }
    if !expanded.contains('*') {
        return path == expanded || path.starts_with(&format!("{expanded}/"));
    }
    let pattern = format!(
        "^{}$",
        regex::escape(&expanded).replace(r"\*", ".*")
    );
    regex::Regex::new(&pattern).map(|r| r.is_match(path)).unwrap_or(false)
}

fn expand_home(glob: &str) -> String {
    if let Some(rest) = glob.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    glob.to_string()
}

// ─── Host invocation ───────────────────────────────────────────────────────

/// The isolation primitive available on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    /// `sandbox-exec` with a generated policy string.
    MacOs,
    /// `bwrap` with a flag list.
    Linux,
    /// No isolation primitive; commands pass through.
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else if cfg!(target_os = "linux") {
            HostPlatform::Linux
        } else {
            HostPlatform::Other
        }
    }
}

/// Rewrite a shell command into a sandboxed argv for the given platform.
///
/// When `enabled` is false the command passes through as `/bin/sh -c <cmd>`.
pub fn wrap_command(
    command: &str,
    profile: &SandboxProfile,
    enabled: bool,
    platform: HostPlatform,
) -> Vec<String> {
    if !enabled {
        return shell_argv(command);
    }
    match platform {
        HostPlatform::MacOs => seatbelt_argv(command, profile),
        HostPlatform::Linux => bwrap_argv(command, profile),
        HostPlatform::Other => shell_argv(command),
    }
}

fn shell_argv(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

/// Build the `sandbox-exec` policy string and argv.
///
/// Policy form: `(version 1) (allow default)` followed by targeted denials,
/// mirroring the "allow by default, subtract" style the host expects.
fn seatbelt_argv(command: &str, profile: &SandboxProfile) -> Vec<String> {
    let mut policy = String::from("(version 1)\n(allow default)\n");

    for glob in &profile.fs.deny_read {
        let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
        if path.is_empty() {
            continue;
        }
        policy.push_str(&format!("(deny file-read* (subpath \"{path}\"))\n"));
    }

    if profile.is_read_only() {
        policy.push_str("(deny file-write* (subpath \"/\"))\n");
        for glob in &profile.fs.allow_write {
            let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
            policy.push_str(&format!("(allow file-write* (subpath \"{path}\"))\n"));
        }
    } else {
        for glob in &profile.fs.deny_write {
            let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
            if path.is_empty() {
                continue;
            }
            policy.push_str(&format!("(deny file-write* (subpath \"{path}\"))\n"));
        }
    }

    if !profile.net.is_unrestricted() {
        policy.push_str("(deny network*)\n");
    }

    vec![
        "sandbox-exec".to_string(),
        "-p".to_string(),
        policy,
        "/bin/sh".to_string(),
        "-c".to_string(),
        command.to_string(),
    ]
}

/// Build the `bwrap` flag list: root mounted read-only, writable bindings
/// for allowed paths, tmpfs over denied directories, and a network unshare
/// unless the profile is network-unrestricted.
fn bwrap_argv(command: &str, profile: &SandboxProfile) -> Vec<String> {
    let mut argv = vec![
        "bwrap".to_string(),
        "--ro-bind".to_string(),
        "/".to_string(),
        "/".to_string(),
        "--dev".to_string(),
        "/dev".to_string(),
        "--proc".to_string(),
        "/proc".to_string(),
        "--tmpfs".to_string(),
        "/tmp".to_string(),
    ];

    if !profile.is_read_only() {
        for glob in &profile.fs.allow_write {
            let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
            if path.is_empty() {
                continue;
            }
            argv.push("--bind".to_string());
            argv.push(path.clone());
            argv.push(path);
        }
        for glob in &profile.fs.deny_write {
            let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
            if path.is_empty() || path == "/" {
                continue;
            }
            argv.push("--tmpfs".to_string());
            argv.push(path);
        }
    }

    // Denied-read directories are masked with empty tmpfs mounts.
    for glob in &profile.fs.deny_read {
        let path = expand_home(glob.trim_end_matches("/*").trim_end_matches('*'));
        if path.is_empty() {
            continue;
        }
        argv.push("--tmpfs".to_string());
        argv.push(path);
    }

    if !profile.net.is_unrestricted() {
        argv.push("--unshare-net".to_string());
    }

    argv.push("/bin/sh".to_string());
    argv.push("-c".to_string());
    argv.push(command.to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn read_only_profile_denies_all_writes() {
        let p = SandboxProfile::read_only();
        assert!(p.is_read_only());
        assert!(!p.allows_write(Path::new("/workspace/a.rs")));
        assert!(p.allows_read(Path::new("/workspace/a.rs")));
    }

    #[test]
    fn workspace_profile_confines_writes() {
        let p = SandboxProfile::workspace_write(Path::new("/work/project"));
        assert!(p.allows_write(Path::new("/work/project/src/main.rs")));
        assert!(!p.allows_write(Path::new("/etc/passwd")));
    }

    #[test]
    fn deny_write_wins_over_allow_write() {
        let mut p = SandboxProfile::workspace_write(Path::new("/work"));
        p.fs.deny_write.push("/work/locked".to_string());
        assert!(p.allows_write(Path::new("/work/src/a.rs")));
        assert!(!p.allows_write(Path::new("/work/locked")));
        assert!(!p.allows_write(Path::new("/work/locked/f.txt")));
    }

    #[test]
    fn secret_paths_always_denied() {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        for profile in [
            SandboxProfile::read_only(),
            SandboxProfile::workspace_write(Path::new("/w")),
        ] {
            assert!(!profile.allows_read(&home.join(".ssh/id_rsa")));
            assert!(!profile.allows_read(&home.join(".aws/credentials")));
        }
    }

    #[test]
    fn domain_matching() {
        let net = NetProfile {
            allowed_domains: vec!["api.example.com".into(), "*.docs.rs".into()],
        };
        assert!(net.allows_domain("api.example.com"));
        assert!(net.allows_domain("static.docs.rs"));
        assert!(!net.allows_domain("evil.com"));
        assert!(NetProfile::unrestricted().allows_domain("anything.io"));
    }

    #[test]
    fn disabled_wrapper_passes_through() {
        let argv = wrap_command("ls -la", &SandboxProfile::read_only(), false, HostPlatform::Linux);
        assert_eq!(argv, vec!["/bin/sh", "-c", "ls -la"]);
    }

    #[test]
    fn seatbelt_policy_shape() {
        let argv = wrap_command(
            "echo hi",
            &SandboxProfile::read_only(),
            true,
            HostPlatform::MacOs,
        );
        assert_eq!(argv[0], "sandbox-exec");
        assert_eq!(argv[1], "-p");
        let policy = &argv[2];
        assert!(policy.starts_with("(version 1)\n(allow default)\n"));
        assert!(policy.contains("(deny file-write* (subpath \"/\"))"));
        assert!(policy.contains(".ssh"));
        assert!(policy.contains("(deny network*)"));
        assert_eq!(&argv[3..5], &["/bin/sh", "-c"]);
    }

    #[test]
    fn bwrap_flags_shape() {
        let profile = SandboxProfile::workspace_write(Path::new("/work"));
        let argv = wrap_command("make test", &profile, true, HostPlatform::Linux);
        assert_eq!(argv[0], "bwrap");
        assert!(argv.windows(2).any(|w| w == ["--ro-bind", "/"]));
        assert!(argv.windows(3).any(|w| w == ["--bind", "/work", "/work"]));
        assert!(argv.contains(&"--unshare-net".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("make test"));
    }

    #[test]
    fn bwrap_keeps_network_when_unrestricted() {
        let profile =
            SandboxProfile::workspace_write(Path::new("/w")).with_domains(vec!["*".into()]);
        let argv = wrap_command("curl example.com", &profile, true, HostPlatform::Linux);
        assert!(!argv.contains(&"--unshare-net".to_string()));
    }
}
