use std::{env, thread};

use chrono::{Local, SecondsFormat};

/// Resolves the body of a namespaced template token, e.g. `HOME` in `${ENV:HOME}`.
pub trait NamespaceResolver: Send + Sync {
    /// Value for `name`, or `None` if unknown.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// `ENV` namespace: process environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvResolver;

impl NamespaceResolver for EnvResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

/// `SYS` namespace: machine and process properties.
///
/// Property names are case-insensitive: `MachineName`, `UserName`,
/// `ProcessorCount`, `Is64Bit`, `Now` (RFC 3339, local time) and `Today`
/// (`YYYY-MM-DD`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl NamespaceResolver for SystemResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "machinename" => first_env(&["HOSTNAME", "COMPUTERNAME"]).or_else(read_hostname),
            "username" => first_env(&["USER", "USERNAME", "LOGNAME"]),
            "processorcount" => Some(
                thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
                    .to_string(),
            ),
            "is64bit" => Some(cfg!(target_pointer_width = "64").to_string()),
            "now" => Some(Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)),
            "today" => Some(Local::now().format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
}

fn read_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
