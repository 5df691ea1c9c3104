//! Channel and bus specifier resolution.
//!
//! API and CLI callers name channels either by index (`"3"`) or by the
//! device-reported name (`"usb1"`, `"Hp 1"`), matched case-insensitively
//! and ignoring internal spaces.

use mixctl_core::error::{MixerError, Result};

/// Resolve a channel specifier against the cached input names.
pub fn resolve_channel(inputs: &[String], spec: &str) -> Result<usize> {
    lookup(inputs, spec).ok_or_else(|| MixerError::UnknownChannel(spec.to_string()))
}

/// Resolve a bus specifier against the cached output names.
pub fn resolve_bus(outputs: &[String], spec: &str) -> Result<usize> {
    lookup(outputs, spec).ok_or_else(|| MixerError::UnknownBus(spec.to_string()))
}

fn lookup(names: &[String], spec: &str) -> Option<usize> {
    let spec = spec.trim();
    if let Ok(index) = spec.parse::<usize>() {
        return (index < names.len()).then_some(index);
    }

    let wanted = spec.to_lowercase();
    let wanted_packed: String = wanted.split_whitespace().collect();
    names.iter().position(|name| {
        let lowered = name.trim().to_lowercase();
        lowered == wanted || lowered.replace(' ', "") == wanted_packed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["IN1", "IN2", "PC", "USB 1", "Hp 1", "OUT2"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn resolves_by_index() {
        assert_eq!(resolve_channel(&names(), "0").unwrap(), 0);
        assert_eq!(resolve_channel(&names(), "5").unwrap(), 5);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        assert!(matches!(
            resolve_channel(&names(), "6"),
            Err(MixerError::UnknownChannel(_))
        ));
    }

    #[test]
    fn resolves_by_name_case_insensitively() {
        assert_eq!(resolve_channel(&names(), "pc").unwrap(), 2);
        assert_eq!(resolve_channel(&names(), "  In1 ").unwrap(), 0);
    }

    #[test]
    fn resolves_names_ignoring_spaces() {
        assert_eq!(resolve_channel(&names(), "usb1").unwrap(), 3);
        assert_eq!(resolve_bus(&names(), "HP1").unwrap(), 4);
    }

    #[test]
    fn unknown_name_is_an_error() {
        match resolve_bus(&names(), "subwoofer") {
            Err(MixerError::UnknownBus(spec)) => assert_eq!(spec, "subwoofer"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
