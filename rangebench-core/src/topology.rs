//! Discovery of the host the benchmark runs on.

use std::fmt;

use crate::record::HostInfo;

/// Number of physical cores and hardware threads of the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HardwareConcurrency {
    /// Physical cores.
    pub cores: u64,
    /// Hardware threads, including SMT siblings.
    pub threads: u64,
}

/// Describes the host the benchmark runs on.
///
/// Discovery never fails. Implementations fall back to defaults whenever a lookup is
/// unavailable, since the benchmark itself does not depend on accurate metadata.
#[async_trait::async_trait]
pub trait Topology: fmt::Debug + Send + Sync {
    /// Returns the hardware concurrency of the host.
    fn hardware_concurrency(&self) -> HardwareConcurrency;

    /// Returns a coarse hardware tier, such as a cloud instance type.
    async fn instance_class(&self) -> Option<String>;

    /// Returns a stable identifier of the host.
    async fn host_id(&self) -> String;

    /// Returns the cloud region of the host, if known.
    async fn region(&self) -> Option<String>;

    /// Resolves the identity written into result rows.
    async fn host_info(&self) -> HostInfo {
        HostInfo {
            host_id: self.host_id().await,
            instance_class: self.instance_class().await,
        }
    }
}

/// A topology with fixed answers.
#[derive(Clone, Debug)]
pub struct StaticTopology {
    /// The host identity.
    pub host: HostInfo,
    /// The reported region.
    pub region: Option<String>,
    /// The reported hardware concurrency.
    pub concurrency: HardwareConcurrency,
}

#[async_trait::async_trait]
impl Topology for StaticTopology {
    fn hardware_concurrency(&self) -> HardwareConcurrency {
        self.concurrency
    }

    async fn instance_class(&self) -> Option<String> {
        self.host.instance_class.clone()
    }

    async fn host_id(&self) -> String {
        self.host.host_id.clone()
    }

    async fn region(&self) -> Option<String> {
        self.region.clone()
    }
}
