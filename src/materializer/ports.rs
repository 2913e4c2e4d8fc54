use rand::Rng;

use crate::constants::GALERA_SST_PORT_OFFSET;
use crate::constants::PORT_BASE_MAX_HUNDREDS;
use crate::constants::PORT_BASE_MIN_HUNDREDS;
use crate::constants::PORT_STRIDE;
use crate::Error;
use crate::Result;

/// Largest node index whose ports, Galera offsets included, fit in `u16`
/// for every base `PortPlan::random` can pick
pub const MAX_NODE_INDEX: usize =
    ((u16::MAX - PORT_BASE_MAX_HUNDREDS * PORT_STRIDE - GALERA_SST_PORT_OFFSET) / PORT_STRIDE) as usize;

/// Client port assignment for one cluster.
///
/// Node `i` listens on `base + i * stride`. The Galera side ports sit at
/// small fixed offsets from the client port, well inside one stride, so no
/// two nodes of the same plan ever share a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
    base: u16,
}

impl PortPlan {
    /// Random base so concurrent suites sharing a host rarely collide
    pub fn random() -> Self {
        let hundreds = rand::thread_rng().gen_range(PORT_BASE_MIN_HUNDREDS..=PORT_BASE_MAX_HUNDREDS);
        Self {
            base: hundreds * PORT_STRIDE,
        }
    }

    pub fn with_base(base: u16) -> Self {
        Self { base }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Client port of node `index`; fails if it or its Galera ports would
    /// not fit in a port number
    pub fn port_for(
        &self,
        index: usize,
    ) -> Result<u16> {
        u16::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(PORT_STRIDE))
            .and_then(|offset| self.base.checked_add(offset))
            .filter(|port| port.checked_add(GALERA_SST_PORT_OFFSET).is_some())
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "node{} does not fit the port range starting at {}",
                    index, self.base
                ))
            })
    }
}
