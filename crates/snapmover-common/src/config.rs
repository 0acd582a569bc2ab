//! Plugin configuration
//!
//! Every action receives a `PluginConfig` at construction. The binary builds
//! it from flags with environment fallbacks; tests build it directly. No
//! action reads process state on its own.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::crd::MoverFlavor;
use crate::poll::PollSettings;

/// Default name of the secret holding the mover repository credentials
pub const DEFAULT_RESTIC_SECRET: &str = "restic-secret";

/// Data-mover behaviour switches and wait bounds
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct PluginConfig {
    /// Route CSI snapshots through the data mover
    #[arg(
        long = "data-mover",
        env = "VOLUME_SNAPSHOT_MOVER",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub data_mover_enabled: bool,

    /// Mover CRD family to use
    #[arg(
        long,
        env = "SNAPSHOT_MOVER_API",
        value_enum,
        default_value_t = MoverFlavor::VolumeSnapshotMover
    )]
    pub mover_api: MoverFlavor,

    /// Secret with the mover repository credentials, referenced by restore requests
    #[arg(long, env = "MOVER_RESTIC_SECRET", default_value = DEFAULT_RESTIC_SECRET)]
    pub restic_secret_name: String,

    /// Seconds between polls of external controllers
    #[arg(long, env = "MOVER_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Seconds to wait for a mover request to finish
    #[arg(long, env = "MOVER_TIMEOUT_SECS", default_value_t = 300)]
    pub mover_timeout_secs: u64,

    /// Seconds to wait for snapshot content reconciliation
    #[arg(long, env = "CONTENT_TIMEOUT_SECS", default_value_t = 600)]
    pub content_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            data_mover_enabled: false,
            mover_api: MoverFlavor::VolumeSnapshotMover,
            restic_secret_name: DEFAULT_RESTIC_SECRET.to_string(),
            poll_interval_secs: 5,
            mover_timeout_secs: 300,
            content_timeout_secs: 600,
        }
    }
}

impl PluginConfig {
    /// Config with the data mover switched on for the given flavor
    pub fn with_mover(flavor: MoverFlavor) -> Self {
        Self {
            data_mover_enabled: true,
            mover_api: flavor,
            ..Default::default()
        }
    }

    /// Wait bounds for mover requests and replication destinations
    pub fn mover_poll(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.mover_timeout_secs),
        }
    }

    /// Wait bounds for snapshot and snapshot content reconciliation
    pub fn content_poll(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.content_timeout_secs),
        }
    }
}

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach the cluster
#[derive(Args, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientSettings {
    /// Kubeconfig file; in-cluster or default config is inferred when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub read_timeout_secs: u64,
}

impl ClientSettings {
    /// Connect timeout, falling back to the default when zero
    pub fn connect_timeout(&self) -> Duration {
        match self.connect_timeout_secs {
            0 => DEFAULT_CONNECT_TIMEOUT,
            s => Duration::from_secs(s),
        }
    }

    /// Read timeout, falling back to the default when zero
    pub fn read_timeout(&self) -> Duration {
        match self.read_timeout_secs {
            0 => DEFAULT_READ_TIMEOUT,
            s => Duration::from_secs(s),
        }
    }
}
