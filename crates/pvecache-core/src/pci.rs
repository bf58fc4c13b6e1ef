//! PCI bus id handling.
//!
//! A super-device id has no function suffix (`0000:00:05`); a function id
//! has one (`0000:00:05.2`).

use crate::error::{CacheError, Result};

/// Target of a `hostpciN` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PciTarget {
    /// Whole device; every function under the bus id is claimed.
    Device(String),
    /// A single function of a device.
    Function { bus_id: String, function: String },
}

pub fn is_super_device(bus_id: &str) -> bool {
    !bus_id.contains('.')
}

/// Prefix the default PCI domain onto short ids (`01:00` -> `0000:01:00`).
pub fn normalize(bus_id: &str) -> String {
    if bus_id.matches(':').count() == 1 {
        format!("0000:{bus_id}")
    } else {
        bus_id.to_string()
    }
}

/// Split a function id into its bus id and function suffix.
pub fn split_function_id(id: &str) -> Result<(String, String)> {
    let mut parts = id.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(bus), Some(function), None) if !bus.is_empty() && !function.is_empty() => {
            Ok((normalize(bus), function.to_string()))
        }
        (Some(_), Some(_), Some(_)) => Err(CacheError::parse(
            "bus id",
            id,
            "contained more than one '.'",
        )),
        _ => Err(CacheError::parse("bus id", id, "expected <bus>.<function>")),
    }
}

/// Parse a `hostpciN` value (`busId[,opt=val,...]`).
pub fn parse_assignment(descriptor: &str) -> Result<PciTarget> {
    let head = descriptor.split(',').next().unwrap_or_default().trim();
    if head.is_empty() {
        return Err(CacheError::parse("hostpci", descriptor, "empty bus id"));
    }
    if head.starts_with("mapping=") {
        return Err(CacheError::Unsupported(format!(
            "resource mapping assignment '{head}'"
        )));
    }
    if is_super_device(head) {
        return Ok(PciTarget::Device(normalize(head)));
    }
    let (bus_id, function) = split_function_id(head)?;
    Ok(PciTarget::Function { bus_id, function })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_device() {
        assert!(is_super_device("0000:00:05"));
        assert!(!is_super_device("0000:00:05.2"));
    }

    #[test]
    fn test_normalize_short_id() {
        assert_eq!(normalize("01:00"), "0000:01:00");
        assert_eq!(normalize("0000:01:00"), "0000:01:00");
    }

    #[test]
    fn test_split_function_id() {
        let (bus, func) = split_function_id("0000:00:1f.3").unwrap();
        assert_eq!(bus, "0000:00:1f");
        assert_eq!(func, "3");
        assert!(split_function_id("0000:00:1f").is_err());
        assert!(split_function_id("0000:00.1f.3").is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("0000:00:05,pcie=1,x-vga=1").unwrap(),
            PciTarget::Device("0000:00:05".to_string())
        );
        assert_eq!(
            parse_assignment("01:00.0,pcie=1").unwrap(),
            PciTarget::Function {
                bus_id: "0000:01:00".to_string(),
                function: "0".to_string()
            }
        );
    }

    #[test]
    fn test_parse_assignment_mapping_unsupported() {
        let err = parse_assignment("mapping=gpu0,pcie=1").unwrap_err();
        assert!(matches!(err, CacheError::Unsupported(_)));
    }

    #[test]
    fn test_parse_assignment_empty() {
        assert!(matches!(
            parse_assignment(",pcie=1"),
            Err(CacheError::Parse { .. })
        ));
    }
}
