//! Vendor command profiles.
//!
//! Each supported CLI dialect has a fixed, ordered list of diagnostic commands
//! and a set of prompt terminators whose appearance in the read buffer means
//! the device is ready for the next command.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Vendor tags supported by this crate.
pub const SUPPORTED_VENDORS: &[&str] = &["huawei", "zte"];

const HUAWEI_COMMANDS: &[&str] = &[
    "screen-length 0 temporary",
    "display version",
    "display license",
    "display current-configuration",
    "display interface brief",
    "display interface description",
    "display interface transceiver",
    "display eth-trunk brief",
    "display bgp peer",
    "display ospf peer",
    "display isis peer",
];

const ZTE_COMMANDS: &[&str] = &[
    "terminal length 0",
    "show version",
    "show license",
    "show running-config",
    "show interface brief",
    "show interface description",
    "show interface transceiver",
    "show port-channel brief",
    "show bgp summary",
    "show ospf neighbor",
    "show isis neighbor",
];

// VRP prompts look like `<HOST>` in user view and `[HOST]` in system view.
const HUAWEI_PROMPTS: &[&str] = &["<", ">", "]"];
const ZTE_PROMPTS: &[&str] = &["#", ">"];

/// A supported CLI dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Huawei VRP-style `display` commands.
    Huawei,
    /// ZTE-style `show` commands.
    Zte,
}

impl Vendor {
    /// Lowercase tag used in config files, logs and transcript file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Huawei => "huawei",
            Vendor::Zte => "zte",
        }
    }

    /// Ordered diagnostic commands for this vendor.
    pub fn commands(&self) -> &'static [&'static str] {
        match self {
            Vendor::Huawei => HUAWEI_COMMANDS,
            Vendor::Zte => ZTE_COMMANDS,
        }
    }

    /// Prompt terminator substrings for this vendor.
    pub fn prompts(&self) -> &'static [&'static str] {
        match self {
            Vendor::Huawei => HUAWEI_PROMPTS,
            Vendor::Zte => ZTE_PROMPTS,
        }
    }
}

impl FromStr for Vendor {
    type Err = HarvestError;

    /// Parses a vendor tag, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huawei" => Ok(Vendor::Huawei),
            "zte" => Ok(Vendor::Zte),
            _ => Err(HarvestError::UnknownVendor(s.to_string())),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the ordered command list for a vendor tag.
pub fn commands_for_vendor(vendor: &str) -> Result<&'static [&'static str], HarvestError> {
    Ok(vendor.parse::<Vendor>()?.commands())
}

/// Returns the prompt terminators for a vendor tag.
pub fn prompts_for_vendor(vendor: &str) -> Result<&'static [&'static str], HarvestError> {
    Ok(vendor.parse::<Vendor>()?.prompts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_vendor_has_commands_and_prompts() {
        for name in SUPPORTED_VENDORS {
            let commands = commands_for_vendor(name).expect("commands");
            let prompts = prompts_for_vendor(name).expect("prompts");
            assert!(!commands.is_empty(), "{name} has no commands");
            assert!(!prompts.is_empty(), "{name} has no prompts");
        }
    }

    #[test]
    fn unknown_vendor_is_rejected_by_both_lookups() {
        for name in ["cisco", "", "huawei2"] {
            assert!(matches!(
                commands_for_vendor(name),
                Err(HarvestError::UnknownVendor(_))
            ));
            assert!(matches!(
                prompts_for_vendor(name),
                Err(HarvestError::UnknownVendor(_))
            ));
        }
    }

    #[test]
    fn vendor_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(" HuaWei ".parse::<Vendor>().expect("parse"), Vendor::Huawei);
        assert_eq!("ZTE".parse::<Vendor>().expect("parse"), Vendor::Zte);
    }

    #[test]
    fn paging_is_disabled_before_any_diagnostic_command() {
        assert_eq!(Vendor::Huawei.commands()[0], "screen-length 0 temporary");
        assert_eq!(Vendor::Zte.commands()[0], "terminal length 0");
    }
}
