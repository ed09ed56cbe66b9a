//! Deterministic subnet allocation.
//!
//! A range is treated as a sequence of equally sized blocks starting at its
//! network address. The `i`-th availability zone receives block
//! `offset + i`. Each tier has a fixed layout chosen so tiers never collide
//! inside a default `/16`:
//!
//! ```text
//! 10.0.0.0/16
//! ├── public   /24 blocks 0..3   10.0.0.0  – 10.0.2.255
//! └── private  /20 blocks 1..4   10.0.16.0 – 10.0.63.255
//! 100.64.0.0/16 (first secondary range)
//! └── pod      /18 blocks 0..3   100.64.0.0 – 100.64.191.255
//! ```

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{ConfigError, ConfigResult};

/// Block size and starting block for one subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLayout {
    /// Prefix length of every subnet in the tier.
    pub prefix: u8,
    /// Index of the first block handed out.
    pub offset: u32,
}

/// Public subnets: `/24` from the start of the primary range.
pub const PUBLIC_TIER: TierLayout = TierLayout {
    prefix: 24,
    offset: 0,
};

/// Private subnets: `/20` starting 4096 addresses into the primary range.
pub const PRIVATE_TIER: TierLayout = TierLayout {
    prefix: 20,
    offset: 1,
};

/// Pod subnets: `/18` from the start of the first secondary range.
pub const POD_TIER: TierLayout = TierLayout {
    prefix: 18,
    offset: 0,
};

/// Allocate one subnet per availability zone.
///
/// Output order follows `azs`. The result depends only on the arguments.
/// Whether the blocks fit inside `range` is not checked here; validation
/// reports that as a containment violation.
pub fn allocate(
    range: Ipv4Net,
    azs: &[String],
    prefix: u8,
    offset: u32,
) -> ConfigResult<Vec<(Ipv4Net, String)>> {
    let block_size = block_size(prefix).ok_or(ConfigError::AddressExhausted {
        base: range,
        prefix,
        block: offset,
    })?;
    let base = u32::from(range.network());

    azs.iter()
        .enumerate()
        .map(|(i, az)| {
            let block = u32::try_from(i)
                .ok()
                .and_then(|i| offset.checked_add(i))
                .ok_or(ConfigError::AddressExhausted {
                    base: range,
                    prefix,
                    block: offset,
                })?;

            let start = u64::from(base) + u64::from(block) * block_size;
            let start = u32::try_from(start).map_err(|_| ConfigError::AddressExhausted {
                base: range,
                prefix,
                block,
            })?;

            let net = Ipv4Net::new(Ipv4Addr::from(start), prefix).map_err(|_| {
                ConfigError::AddressExhausted {
                    base: range,
                    prefix,
                    block,
                }
            })?;

            Ok((net, az.clone()))
        })
        .collect()
}

/// Allocate a tier using its fixed layout.
pub fn allocate_tier(
    range: Ipv4Net,
    azs: &[String],
    layout: TierLayout,
) -> ConfigResult<Vec<(Ipv4Net, String)>> {
    allocate(range, azs, layout.prefix, layout.offset)
}

/// Whether `inner` lies entirely inside `outer`.
#[must_use]
pub fn contains(outer: &Ipv4Net, inner: &Ipv4Net) -> bool {
    outer.contains(inner)
}

/// Whether two ranges share at least one address.
#[must_use]
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

fn block_size(prefix: u8) -> Option<u64> {
    if prefix > 32 {
        return None;
    }
    Some(1_u64 << (32 - u32::from(prefix)))
}
