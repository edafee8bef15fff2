//! Host hooks
//!
//! The engine reaches the outside world only through [`InteropHost`]. Every
//! method has a default, so a host overrides just what it needs.

use bytecode_system::Instruction;
use core_types::{VmError, VmResult};

use crate::context::ExecutionContext;
use crate::vm::{ExecutionEngine, VMState};

/// Services a host provides to an [`ExecutionEngine`]
///
/// While a hook runs the host is detached from the engine, so hooks are free
/// to push, pop and load contexts through the `engine` argument.
pub trait InteropHost {
    /// Handle `SYSCALL method`.
    fn on_syscall(&mut self, engine: &mut ExecutionEngine, method: u32) -> VmResult<()> {
        let _ = engine;
        Err(VmError::SyscallNotFound(method))
    }

    /// Resolve `CALLT token` into a context for the engine to load.
    fn load_token(&mut self, engine: &mut ExecutionEngine, token: u16) -> VmResult<ExecutionContext> {
        let _ = engine;
        Err(VmError::TokenNotFound(token))
    }

    /// Observe a state transition.
    fn on_state_changed(&mut self, from: VMState, to: VMState) {
        let _ = (from, to);
    }

    /// Runs before each instruction. An error faults the engine.
    fn pre_execute_instruction(
        &mut self,
        engine: &mut ExecutionEngine,
        instruction: &Instruction,
    ) -> VmResult<()> {
        let _ = (engine, instruction);
        Ok(())
    }

    /// Runs after each instruction, once the reference limit has been checked.
    fn post_execute_instruction(
        &mut self,
        engine: &mut ExecutionEngine,
        instruction: &Instruction,
    ) -> VmResult<()> {
        let _ = (engine, instruction);
        Ok(())
    }
}
