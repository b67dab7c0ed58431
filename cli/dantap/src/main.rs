//! dantap binary.
//!
//! Reads the verb and sandbox context from `CNI_*` environment variables and
//! the network configuration from stdin. Results and error objects are
//! written to stdout; a failed verb exits with status 1.

use std::io::Read;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use dan_descriptor::DescriptorStore;
use dan_tap::config::DEFAULT_CNI_VERSION;
use dan_tap::plugin::version_hint;
use dan_tap::{Command, ErrorResponse, ExecIpam, Invocation, IpCommand, Plugin, PluginConfig, PluginError};

fn main() -> Result<()> {
    let config = PluginConfig::from_env()?;
    dan_tap::logging::init(&config);

    let invocation = match Invocation::try_parse() {
        Ok(invocation) => invocation,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let err = PluginError::InvalidEnvironment(e.to_string());
            fail(DEFAULT_CNI_VERSION, &err)?;
            std::process::exit(1);
        }
    };

    info!(
        command = ?invocation.command,
        container_id = ?invocation.container_id,
        netns = ?invocation.netns,
        ifname = ?invocation.ifname,
        ">>>>>>>> dantap"
    );

    let mut stdin = Vec::new();
    if invocation.command != Command::Version {
        std::io::stdin()
            .read_to_end(&mut stdin)
            .context("failed to read network configuration from stdin")?;
    }

    let plugin = Plugin::new(
        IpCommand::new(),
        ExecIpam::new(invocation.search_path()),
        DescriptorStore::new(&config.state_dir),
    );

    match plugin.run(&invocation, &stdin) {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {}
        Err(e) => {
            error!(command = ?invocation.command, error = %e, "Command failed");
            fail(&version_hint(&stdin), &e)?;
            std::process::exit(1);
        }
    }

    info!(command = ?invocation.command, "<<<<<<<< dantap");
    Ok(())
}

/// Print the error object for a failed verb.
fn fail(cni_version: &str, err: &PluginError) -> Result<()> {
    let response = ErrorResponse::new(cni_version, err);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
