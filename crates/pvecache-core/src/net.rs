//! Network interface descriptor parsing (`virtio=..,bridge=vmbr0,rate=10,tag=20`).

use crate::error::{CacheError, Result};
use crate::model::Net;

/// Parse a net config string. Only `rate=` and `tag=` are extracted; other
/// keys are ignored and absent fields stay zero.
pub fn parse(raw: &str) -> Result<Net> {
    let mut net = Net {
        raw: raw.to_string(),
        ..Net::default()
    };

    for option in raw.split(',') {
        if let Some(value) = option.strip_prefix("rate=") {
            net.rate = value
                .parse()
                .map_err(|e| CacheError::parse("net", raw, format!("rate: {e}")))?;
        } else if let Some(value) = option.strip_prefix("tag=") {
            net.vlan = value
                .parse()
                .map_err(|e| CacheError::parse("net", raw, format!("tag: {e}")))?;
        }
    }

    Ok(net)
}
