//! Breakpoints and stepping
//!
//! A [`Debugger`] drives an engine one instruction at a time and pauses it in
//! [`VMState::Break`] when execution reaches a breakpoint or a step finishes.

use std::collections::HashSet;

use bytecode_system::Script;

use crate::vm::{ExecutionEngine, VMState};

/// Stepping and breakpoint controller over a borrowed engine
#[derive(Debug)]
pub struct Debugger<'a> {
    engine: &'a mut ExecutionEngine,
    break_points: Vec<(Script, HashSet<usize>)>,
}

impl<'a> Debugger<'a> {
    /// Attach to `engine`
    pub fn new(engine: &'a mut ExecutionEngine) -> Self {
        Self {
            engine,
            break_points: Vec::new(),
        }
    }

    /// The engine being debugged
    pub fn engine(&self) -> &ExecutionEngine {
        self.engine
    }

    /// Mutable access to the engine being debugged
    pub fn engine_mut(&mut self) -> &mut ExecutionEngine {
        self.engine
    }

    /// Pause before the instruction at `position` of `script`
    ///
    /// Breakpoints match scripts by identity.
    pub fn add_break_point(&mut self, script: &Script, position: usize) {
        match self.break_points.iter_mut().find(|(s, _)| s.ptr_eq(script)) {
            Some((_, positions)) => {
                positions.insert(position);
            }
            None => self
                .break_points
                .push((script.clone(), HashSet::from([position]))),
        }
    }

    /// Remove a breakpoint; false if it was not set
    pub fn remove_break_point(&mut self, script: &Script, position: usize) -> bool {
        let Some(index) = self.break_points.iter().position(|(s, _)| s.ptr_eq(script)) else {
            return false;
        };
        let positions = &mut self.break_points[index].1;
        if !positions.remove(&position) {
            return false;
        }
        if positions.is_empty() {
            self.break_points.remove(index);
        }
        true
    }

    /// Run until the engine halts, faults or reaches a breakpoint
    pub fn execute(&mut self) -> VMState {
        if self.engine.state() == VMState::Break {
            self.engine.set_state(VMState::None);
        }
        while self.engine.state() == VMState::None {
            self.execute_and_check_break_points();
        }
        self.engine.state()
    }

    fn execute_and_check_break_points(&mut self) {
        self.engine.execute_next();
        if self.engine.state() != VMState::None || self.break_points.is_empty() {
            return;
        }
        let Some(context) = self.engine.current_context() else {
            return;
        };
        let hit = self.break_points.iter().any(|(script, positions)| {
            script.ptr_eq(context.script()) && positions.contains(&context.instruction_pointer())
        });
        if hit {
            tracing::debug!(
                target: "vm::debugger",
                ip = context.instruction_pointer(),
                "breakpoint hit"
            );
            self.engine.set_state(VMState::Break);
        }
    }

    /// Execute one instruction, entering calls
    pub fn step_into(&mut self) -> VMState {
        if matches!(self.engine.state(), VMState::Halt | VMState::Fault) {
            return self.engine.state();
        }
        self.engine.execute_next();
        if self.engine.state() == VMState::None {
            self.engine.set_state(VMState::Break);
        }
        self.engine.state()
    }

    /// Execute one instruction, running any call it makes to completion
    pub fn step_over(&mut self) -> VMState {
        if matches!(self.engine.state(), VMState::Halt | VMState::Fault) {
            return self.engine.state();
        }
        self.engine.set_state(VMState::None);
        let depth = self.engine.invocation_stack().len();
        loop {
            self.execute_and_check_break_points();
            if self.engine.state() != VMState::None
                || self.engine.invocation_stack().len() <= depth
            {
                break;
            }
        }
        if self.engine.state() == VMState::None {
            self.engine.set_state(VMState::Break);
        }
        self.engine.state()
    }

    /// Run until the current context returns
    pub fn step_out(&mut self) -> VMState {
        if self.engine.state() == VMState::Break {
            self.engine.set_state(VMState::None);
        }
        let depth = self.engine.invocation_stack().len();
        while self.engine.state() == VMState::None && self.engine.invocation_stack().len() >= depth
        {
            self.execute_and_check_break_points();
        }
        if self.engine.state() == VMState::None {
            self.engine.set_state(VMState::Break);
        }
        self.engine.state()
    }
}
