//! Pointing the operating system's resolver at the daemon.
//!
//! On macOS this drives `networksetup` for one network service. The
//! servers configured before the redirect are captured so shutdown can put
//! them back.

use std::process::Command;

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Address the OS resolver is pointed at.
pub const LOOPBACK_RESOLVER: &str = "127.0.0.1";

const NO_SERVERS_MARKER: &str = "There aren't any DNS Servers set";

/// DNS servers that were in place before [`DnsRedirect::redirect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreToken {
    servers: Vec<String>,
}

impl RestoreToken {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }

    /// Empty when the service used DHCP-provided servers.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

/// OS hook that redirects system DNS at start and restores it at shutdown.
pub trait DnsRedirect: Send + Sync {
    fn redirect(&self) -> Result<RestoreToken>;

    fn restore(&self, token: &RestoreToken) -> Result<()>;
}

/// Does nothing. Used when redirection is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRedirect;

impl DnsRedirect for NoRedirect {
    fn redirect(&self) -> Result<RestoreToken> {
        Ok(RestoreToken::default())
    }

    fn restore(&self, _token: &RestoreToken) -> Result<()> {
        Ok(())
    }
}

/// macOS `networksetup` backend.
#[derive(Debug, Clone)]
pub struct NetworkSetup {
    service: String,
    program: String,
}

impl NetworkSetup {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_program(service, "networksetup")
    }

    pub fn with_program(service: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::SystemDns(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(Error::SystemDns(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DnsRedirect for NetworkSetup {
    fn redirect(&self) -> Result<RestoreToken> {
        let current = self.run(&["-getdnsservers".to_string(), self.service.clone()])?;
        let token = RestoreToken::new(parse_servers(&current));

        self.run(&set_args(&self.service, &[LOOPBACK_RESOLVER.to_string()]))?;
        info!(
            service = %self.service,
            previous = ?token.servers(),
            "system DNS redirected to {LOOPBACK_RESOLVER}"
        );
        Ok(token)
    }

    fn restore(&self, token: &RestoreToken) -> Result<()> {
        let result = self.run(&set_args(&self.service, token.servers()));
        match &result {
            Ok(_) => info!(
                service = %self.service,
                servers = ?token.servers(),
                "system DNS restored"
            ),
            Err(err) => warn!(
                service = %self.service,
                error = %err,
                "failed to restore system DNS"
            ),
        }
        result.map(|_| ())
    }
}

/// Parse `networksetup -getdnsservers` output.
pub fn parse_servers(output: &str) -> Vec<String> {
    if output.contains(NO_SERVERS_MARKER) {
        return Vec::new();
    }
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `-setdnsservers` arguments; `Empty` clears the list.
pub fn set_args(service: &str, servers: &[String]) -> Vec<String> {
    let mut args = vec!["-setdnsservers".to_string(), service.to_string()];
    if servers.is_empty() {
        args.push("Empty".to_string());
    } else {
        args.extend(servers.iter().cloned());
    }
    args
}
