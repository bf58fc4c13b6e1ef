//! Boot order resolution.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{CacheError, Result};
use crate::model::BootOrder;

/// Parse the `order=` list out of a VM `boot` option string.
///
/// The legacy letter form (`cdn`) carries no device ids and yields an empty
/// list, as does an absent `order=` option.
pub fn parse_order(boot: &str) -> Result<Vec<String>> {
    let mut order = Vec::new();
    for option in boot.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        match option.split_once('=') {
            Some(("order", ids)) => {
                order.extend(
                    ids.split(';')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string),
                );
            }
            Some(_) => {}
            None if is_legacy(option) => {}
            None => return Err(CacheError::parse("boot order", boot, "expected key=value")),
        }
    }
    Ok(order)
}

fn is_legacy(option: &str) -> bool {
    option.chars().all(|c| matches!(c, 'a' | 'c' | 'd' | 'n'))
}

/// Split `eligible` into enabled targets (configured order) and disabled
/// targets (sorted). Ids in `order` that are not eligible are logged and
/// dropped; a repeated id only counts once.
pub fn resolve<I>(eligible: I, order: &[String]) -> BootOrder
where
    I: IntoIterator<Item = String>,
{
    let mut remaining: BTreeSet<String> = eligible.into_iter().collect();
    let mut enabled = Vec::new();

    for id in order {
        if remaining.remove(id) {
            enabled.push(id.clone());
        } else {
            warn!(target_id = %id, "Boot target not found among eligible volumes or nets");
        }
    }

    BootOrder {
        enabled,
        disabled: remaining.into_iter().collect(),
    }
}
