//! Error types for the tap plugin.
//!
//! [`PluginError`] is the taxonomy surfaced to the caller. Seam errors
//! ([`LinkError`], [`IpamError`]) stay concrete so callers can classify them
//! with predicates such as [`LinkError::is_not_found`].

use serde::Serialize;
use thiserror::Error;

use dan_descriptor::DescriptorError;

/// Protocol error codes.
pub mod codes {
    pub const INCOMPATIBLE_VERSION: u32 = 1;
    pub const INVALID_ENVIRONMENT: u32 = 4;
    pub const IO_FAILURE: u32 = 5;
    pub const DECODE_FAILURE: u32 = 6;
    pub const INVALID_NETWORK_CONFIG: u32 = 7;
    pub const TRY_AGAIN_LATER: u32 = 11;
    pub const GENERIC: u32 = 999;
}

/// Errors from host link manipulation.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The named link does not exist.
    #[error("link {0} not found")]
    NotFound(String),

    /// A link or address with that name already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The link command ran and failed.
    #[error("ip {args} failed: {stderr}")]
    Command { args: String, stderr: String },

    /// The link command output could not be understood.
    #[error("failed to parse ip output: {0}")]
    Parse(String),

    /// The link command could not be executed.
    #[error("failed to execute ip command: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Returns true if the link was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkError::NotFound(_))
    }

    /// Returns true if the object being created already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, LinkError::AlreadyExists(_))
    }
}

/// Errors from the allocation backend.
#[derive(Debug, Error)]
pub enum IpamError {
    /// No backend binary with that name on the search path.
    #[error("failed to find plugin {plugin:?} in path {search_path}")]
    NotFound { plugin: String, search_path: String },

    /// The backend could not be started or talked to.
    #[error("failed to execute plugin {plugin}: {source}")]
    Spawn {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend reported a protocol error.
    #[error("plugin {plugin} failed: {msg}")]
    Plugin {
        plugin: String,
        code: u32,
        msg: String,
        details: Option<String>,
    },

    /// The backend exited non-zero without a protocol error.
    #[error("plugin {plugin} exited with {status}: {stderr}")]
    Exit {
        plugin: String,
        status: String,
        stderr: String,
    },

    /// The backend's output was not a valid result.
    #[error("failed to decode result from plugin {plugin}: {source}")]
    Decode {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend succeeded but handed out no addresses.
    #[error("IPAM plugin {plugin} returned missing IP config")]
    EmptyResult { plugin: String },
}

/// Plugin errors, surfaced to the caller as protocol error objects.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Malformed or incomplete network configuration.
    #[error("invalid network config: {0}")]
    Configuration(String),

    /// Network configuration is not valid JSON.
    #[error("failed to parse network config: {0}")]
    Decode(#[from] serde_json::Error),

    /// Requested result version is not supported.
    #[error("incompatible CNI version {0}")]
    IncompatibleVersion(String),

    /// Missing or malformed protocol environment.
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Bridge or tap device could not be looked up or created.
    #[error("failed to create {resource}: {source}")]
    ResourceCreation {
        resource: String,
        #[source]
        source: LinkError,
    },

    /// Tap device could not be attached to the bridge or brought up.
    #[error("failed to attach tap device {device}: {source}")]
    Attachment {
        device: String,
        #[source]
        source: LinkError,
    },

    /// Address allocation or release failed.
    #[error("address allocation failed: {0}")]
    Allocation(#[from] IpamError),

    /// Descriptor could not be written.
    #[error("failed to persist descriptor: {0}")]
    Persistence(#[from] DescriptorError),

    /// Device or descriptor absent.
    #[error("not found: {0}")]
    NotFound(String),
}

impl PluginError {
    /// Returns true if the error only reports something already gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            PluginError::NotFound(_) => true,
            PluginError::ResourceCreation { source, .. }
            | PluginError::Attachment { source, .. } => source.is_not_found(),
            PluginError::Persistence(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Protocol error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            PluginError::Configuration(_) => codes::INVALID_NETWORK_CONFIG,
            PluginError::Decode(_) => codes::DECODE_FAILURE,
            PluginError::IncompatibleVersion(_) => codes::INCOMPATIBLE_VERSION,
            PluginError::InvalidEnvironment(_) => codes::INVALID_ENVIRONMENT,
            PluginError::Persistence(_) => codes::IO_FAILURE,
            PluginError::Allocation(IpamError::Plugin { code, .. }) => *code,
            PluginError::ResourceCreation { .. }
            | PluginError::Attachment { .. }
            | PluginError::Allocation(_)
            | PluginError::NotFound(_) => codes::GENERIC,
        }
    }
}

/// Error object written to standard output when a command fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub code: u32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Build the error object for a plugin error.
    pub fn new(cni_version: impl Into<String>, err: &PluginError) -> Self {
        let details = std::error::Error::source(err).map(|source| source.to_string());
        Self {
            cni_version: cni_version.into(),
            code: err.code(),
            msg: err.to_string(),
            details,
        }
    }
}
