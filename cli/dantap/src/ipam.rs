//! Allocation backend invocation.
//!
//! Backends are separate executables named by `ipam.type`. They receive the
//! original configuration document on stdin with `CNI_COMMAND` set to the
//! verb, and answer with a result (ADD) or nothing (DEL) on stdout. A failed
//! backend writes a protocol error object instead.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use dan_descriptor::AllocationResult;

use crate::error::IpamError;

/// Address allocation operations.
pub trait Ipam: Send + Sync {
    /// Allocate addresses for the configuration in `payload`.
    fn add(&self, plugin: &str, payload: &[u8]) -> Result<AllocationResult, IpamError>;

    /// Release addresses allocated for the configuration in `payload`.
    fn del(&self, plugin: &str, payload: &[u8]) -> Result<(), IpamError>;
}

/// Runs backends found on a search path.
#[derive(Debug, Clone)]
pub struct ExecIpam {
    search_path: Vec<PathBuf>,
}

/// Error object written by a failed backend.
#[derive(Debug, Deserialize)]
struct BackendError {
    code: u32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    details: Option<String>,
}

impl ExecIpam {
    /// Create a runner searching the given directories in order.
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Locate a backend binary.
    pub fn find(&self, plugin: &str) -> Result<PathBuf, IpamError> {
        let not_found = || IpamError::NotFound {
            plugin: plugin.to_string(),
            search_path: self
                .search_path
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(":"),
        };

        if plugin.is_empty() || plugin.contains('/') {
            return Err(not_found());
        }

        self.search_path
            .iter()
            .map(|dir| dir.join(plugin))
            .find(|candidate| candidate.is_file())
            .ok_or_else(not_found)
    }

    /// Run a backend and return its stdout.
    fn exec(&self, plugin: &str, verb: &str, payload: &[u8]) -> Result<Vec<u8>, IpamError> {
        let binary = self.find(plugin)?;
        debug!(plugin = %plugin, binary = %binary.display(), verb = %verb, "Executing IPAM plugin");

        let spawn_err = |source| IpamError::Spawn {
            plugin: plugin.to_string(),
            source,
        };

        let mut child = Command::new(&binary)
            .env("CNI_COMMAND", verb)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload).map_err(spawn_err)?;
        }

        let output = child.wait_with_output().map_err(spawn_err)?;

        if !output.status.success() {
            return Err(backend_failure(plugin, &binary, &output));
        }

        Ok(output.stdout)
    }
}

/// Turn a non-zero backend exit into an error, preferring its error object.
fn backend_failure(plugin: &str, binary: &Path, output: &std::process::Output) -> IpamError {
    if let Ok(err) = serde_json::from_slice::<BackendError>(&output.stdout) {
        return IpamError::Plugin {
            plugin: plugin.to_string(),
            code: err.code,
            msg: err.msg,
            details: err.details,
        };
    }

    IpamError::Exit {
        plugin: plugin.to_string(),
        status: format!("{} ({})", output.status, binary.display()),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

impl Ipam for ExecIpam {
    fn add(&self, plugin: &str, payload: &[u8]) -> Result<AllocationResult, IpamError> {
        let stdout = self.exec(plugin, "ADD", payload)?;

        let result: AllocationResult =
            serde_json::from_slice(&stdout).map_err(|source| IpamError::Decode {
                plugin: plugin.to_string(),
                source,
            })?;

        info!(plugin = %plugin, ips = result.ips.len(), routes = result.routes.len(), "IPAM allocation complete");
        Ok(result)
    }

    fn del(&self, plugin: &str, payload: &[u8]) -> Result<(), IpamError> {
        self.exec(plugin, "DEL", payload)?;
        info!(plugin = %plugin, "IPAM release complete");
        Ok(())
    }
}
