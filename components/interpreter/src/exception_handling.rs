//! Try regions

/// Phase of a try region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHandlingState {
    /// Running the guarded block
    Try,
    /// Running the catch block
    Catch,
    /// Running the finally block
    Finally,
}

/// One active `TRY` region
///
/// Pointers are absolute script positions, -1 when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandlingContext {
    catch_pointer: i64,
    finally_pointer: i64,
    end_pointer: i64,
    state: ExceptionHandlingState,
}

impl ExceptionHandlingContext {
    /// A region in the `Try` phase
    pub fn new(catch_pointer: i64, finally_pointer: i64) -> Self {
        Self {
            catch_pointer,
            finally_pointer,
            end_pointer: -1,
            state: ExceptionHandlingState::Try,
        }
    }

    /// Start of the catch block
    pub fn catch_pointer(&self) -> i64 {
        self.catch_pointer
    }

    /// Start of the finally block
    pub fn finally_pointer(&self) -> i64 {
        self.finally_pointer
    }

    /// Where execution continues once the region completes
    pub fn end_pointer(&self) -> i64 {
        self.end_pointer
    }

    pub(crate) fn set_end_pointer(&mut self, end_pointer: i64) {
        self.end_pointer = end_pointer;
    }

    /// Current phase
    pub fn state(&self) -> ExceptionHandlingState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ExceptionHandlingState) {
        self.state = state;
    }

    /// True if the region has a catch block
    pub fn has_catch(&self) -> bool {
        self.catch_pointer >= 0
    }

    /// True if the region has a finally block
    pub fn has_finally(&self) -> bool {
        self.finally_pointer >= 0
    }

    /// True once nothing in the region is left to run for a pending exception
    pub(crate) fn is_finished(&self) -> bool {
        match self.state {
            ExceptionHandlingState::Finally => true,
            ExceptionHandlingState::Catch => !self.has_finally(),
            ExceptionHandlingState::Try => false,
        }
    }
}
