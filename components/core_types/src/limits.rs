//! Execution limits.
//!
//! Limits are plain data so a host can load them from its configuration.
//! Missing fields take the defaults.

use serde::{Deserialize, Serialize};

use crate::error::{VmError, VmResult};

/// Resource limits enforced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionEngineLimits {
    /// Largest shift or exponent accepted by `SHL`, `SHR` and `POW`.
    pub max_shift: u32,
    /// Largest number of live references across all stacks and slots.
    pub max_stack_size: u32,
    /// Largest byte size of a single item.
    pub max_item_size: u32,
    /// Largest byte size taking part in a comparison.
    pub max_comparable_size: u32,
    /// Largest depth of the invocation stack.
    pub max_invocation_stack_size: u32,
    /// Largest depth of nested try regions in one context.
    pub max_try_nesting_depth: u32,
    /// Whether catchable errors are thrown into the script.
    pub catch_engine_exceptions: bool,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_shift: 256,
            max_stack_size: 2 * 1024,
            max_item_size: u16::MAX as u32 * 2,
            max_comparable_size: 65536,
            max_invocation_stack_size: 1024,
            max_try_nesting_depth: 16,
            catch_engine_exceptions: true,
        }
    }
}

impl ExecutionEngineLimits {
    /// Fails unless `0 <= size <= max_item_size`.
    pub fn assert_max_item_size(&self, size: i64) -> VmResult<()> {
        if size < 0 || size > self.max_item_size as i64 {
            return Err(VmError::ItemTooLarge {
                size,
                max: self.max_item_size,
            });
        }
        Ok(())
    }

    /// Fails unless `0 <= shift <= max_shift`.
    pub fn assert_shift(&self, shift: i64) -> VmResult<()> {
        if shift < 0 || shift > self.max_shift as i64 {
            return Err(VmError::InvalidShift {
                shift,
                max: self.max_shift,
            });
        }
        Ok(())
    }
}
