//! Trace builder configuration
//!
//! ```json
//! {
//!   "gen_opts": true,
//!   "enable_cse": true,
//!   "enable_simplification": true,
//!   "calling_convention": { "act_rec_cells": 3 }
//! }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Optimization switches and target parameters for a [`TraceBuilder`](crate::builder::TraceBuilder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Master switch for the forward-pass optimizations
    pub gen_opts: bool,
    pub enable_cse: bool,
    pub enable_simplification: bool,
    /// Check every generated instruction against its catalog contract
    pub check_operand_types: bool,
    pub calling_convention: CallingConvention,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            gen_opts: true,
            enable_cse: true,
            enable_simplification: true,
            check_operand_types: cfg!(debug_assertions),
            calling_convention: CallingConvention::default(),
        }
    }
}

impl JitConfig {
    /// Load a config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// A config with every optimization off.
    pub fn unoptimized() -> Self {
        Self {
            gen_opts: false,
            enable_cse: false,
            enable_simplification: false,
            ..Self::default()
        }
    }

    /// CSE only runs when both switches are on.
    pub fn cse_enabled(&self) -> bool {
        self.gen_opts && self.enable_cse
    }

    pub fn simplification_enabled(&self) -> bool {
        self.gen_opts && self.enable_simplification
    }
}

/// Stack layout of calls on the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallingConvention {
    /// Stack cells occupied by one activation record
    pub act_rec_cells: i32,
    /// Operands following an activation record in a `SpillStack`
    pub spill_act_rec_extra_args: usize,
}

impl Default for CallingConvention {
    fn default() -> Self {
        Self {
            act_rec_cells: 3,
            spill_act_rec_extra_args: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JitConfig::default();
        assert!(config.cse_enabled());
        assert!(config.simplification_enabled());
        assert_eq!(config.calling_convention.act_rec_cells, 3);
        assert_eq!(config.calling_convention.spill_act_rec_extra_args, 4);
    }

    #[test]
    fn test_partial_json() {
        let config = JitConfig::from_json(r#"{"enable_cse": false, "calling_convention": {"act_rec_cells": 4}}"#)
            .unwrap();
        assert!(!config.cse_enabled());
        assert!(config.simplification_enabled());
        assert_eq!(config.calling_convention.act_rec_cells, 4);
        assert_eq!(config.calling_convention.spill_act_rec_extra_args, 4);
    }

    #[test]
    fn test_gen_opts_gates_everything() {
        let config = JitConfig::from_json(r#"{"gen_opts": false}"#).unwrap();
        assert!(!config.cse_enabled());
        assert!(!config.simplification_enabled());
        assert!(!JitConfig::unoptimized().enable_cse);
    }

    #[test]
    fn test_bad_json() {
        assert!(JitConfig::from_json("{").is_err());
    }
}
