//! Conditional-compilation state.

use alloc::vec::Vec;
use core::fmt;

/// Directive that opened a conditional group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    If,
    Ifdef,
    Ifndef,
}

/// State of one open conditional group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalState {
    pub kind: ConditionalKind,
    /// Some branch of this group has already been taken
    pub any_matched: bool,
    /// The current branch is being emitted
    pub active: bool,
    /// `#else` has been seen
    pub seen_else: bool,
    /// Line of the opening directive
    pub line: u32,
}

/// Misplaced conditional directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalError {
    /// `#else`, `#elif` or `#endif` with no open group
    Unmatched(&'static str),
    ElseAfterElse,
    ElifAfterElse,
}

impl fmt::Display for ConditionalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionalError::Unmatched(directive) => {
                write!(f, "#{} without matching #if", directive)
            }
            ConditionalError::ElseAfterElse => f.write_str("#else after #else"),
            ConditionalError::ElifAfterElse => f.write_str("#elif after #else"),
        }
    }
}

/// Stack of open conditional groups above an always-active sentinel.
#[derive(Debug, Clone)]
pub struct ConditionalStack {
    states: Vec<ConditionalState>,
}

impl Default for ConditionalStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self {
            states: alloc::vec![ConditionalState {
                kind: ConditionalKind::If,
                any_matched: true,
                active: true,
                seen_else: false,
                line: 0,
            }],
        }
    }

    /// Whether lines at the current position are emitted.
    pub fn is_active(&self) -> bool {
        self.states.last().is_some_and(|s| s.active)
    }

    /// Number of open groups, excluding the sentinel.
    pub fn depth(&self) -> usize {
        self.states.len() - 1
    }

    fn parent_active(&self) -> bool {
        let n = self.states.len();
        n < 2 || self.states[n - 2].active
    }

    /// Open a group. `condition` is ignored when the enclosing branch is
    /// inactive.
    pub fn push(&mut self, kind: ConditionalKind, condition: bool, line: u32) {
        let taken = self.is_active() && condition;
        self.states.push(ConditionalState {
            kind,
            any_matched: taken,
            active: taken,
            seen_else: false,
            line,
        });
    }

    /// Whether an `#elif` at this point needs its expression evaluated.
    ///
    /// False when a previous branch matched or the group is nested in an
    /// inactive branch; evaluating there could only produce spurious errors.
    pub fn elif_needs_eval(&self) -> bool {
        self.depth() > 0
            && self.parent_active()
            && self.states.last().is_some_and(|s| !s.any_matched && !s.seen_else)
    }

    pub fn elif(&mut self, condition: bool) -> Result<(), ConditionalError> {
        if self.depth() == 0 {
            return Err(ConditionalError::Unmatched("elif"));
        }
        let parent_active = self.parent_active();
        let state = self
            .states
            .last_mut()
            .ok_or(ConditionalError::Unmatched("elif"))?;
        if state.seen_else {
            state.active = false;
            return Err(ConditionalError::ElifAfterElse);
        }
        let taken = parent_active && !state.any_matched && condition;
        state.active = taken;
        state.any_matched |= taken;
        Ok(())
    }

    pub fn else_branch(&mut self) -> Result<(), ConditionalError> {
        if self.depth() == 0 {
            return Err(ConditionalError::Unmatched("else"));
        }
        let parent_active = self.parent_active();
        let state = self
            .states
            .last_mut()
            .ok_or(ConditionalError::Unmatched("else"))?;
        if state.seen_else {
            state.active = false;
            return Err(ConditionalError::ElseAfterElse);
        }
        state.seen_else = true;
        state.active = parent_active && !state.any_matched;
        state.any_matched = true;
        Ok(())
    }

    pub fn endif(&mut self) -> Result<ConditionalState, ConditionalError> {
        if self.depth() == 0 {
            return Err(ConditionalError::Unmatched("endif"));
        }
        self.states.pop().ok_or(ConditionalError::Unmatched("endif"))
    }

    /// Groups still open, innermost last. The sentinel is not included.
    pub fn open_groups(&self) -> &[ConditionalState] {
        &self.states[1..]
    }
}
