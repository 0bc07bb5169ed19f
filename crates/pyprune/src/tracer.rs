//! Optimizer event tracing.
//!
//! The [`OptimizeTracer`] trait has a hook for every decision the passes make that changes the tree.
//! The optimizer carries its tracer as a type parameter, so with [`NoopTracer`] every hook compiles
//! away.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable log on stderr |
//! | [`RecordingTracer`] | Records every event, for tests and post-mortem inspection |
//!
//! ```ignore
//! let mut optimizer = Optimizer::new(OptimizeOptions::default()).with_tracer(RecordingTracer::new());
//! let module = optimizer.optimize(module)?;
//! for event in optimizer.tracer().events() {
//!     println!("{event}");
//! }
//! ```

use std::fmt;

/// How much of a statement a hoist moved out of its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoistKind {
    /// The whole assignment moved above the loop.
    Whole,
    /// A sub-expression moved into a temporary assigned above the loop.
    Partial,
}

/// Pass that emitted a round-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    RemoveUseless,
    HoistInvariants,
}

/// An event recorded by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OptimizeEvent {
    RoundStart {
        round: u32,
    },
    RoundEnd {
        round: u32,
        /// Did the round change the tree?
        changed: bool,
    },
    PassRun {
        pass: Pass,
        round: u32,
    },
    /// A dead statement was deleted.
    StatementRemoved {
        /// Statement kind, e.g. `assign`.
        kind: &'static str,
        line: u32,
    },
    /// A dead `for` loop was replaced by a bare evaluation of its iterable.
    LoopReplaced {
        line: u32,
    },
    /// A statement or sub-expression was moved above its loop.
    Hoisted {
        /// The assigned name: the original target, or the new temporary.
        name: String,
        kind: HoistKind,
        /// Line of the hoisted expression.
        line: u32,
        loop_line: u32,
    },
    /// A dead binding was kept because removing it would change which binding a later read sees.
    BindingPinned {
        name: String,
        line: u32,
    },
}

impl fmt::Display for OptimizeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundStart { round } => write!(f, "round {round}: start"),
            Self::RoundEnd { round, changed } => {
                write!(f, "round {round}: {}", if *changed { "changed" } else { "fixpoint" })
            }
            Self::PassRun { pass, round } => write!(f, "round {round}: {pass:?}"),
            Self::StatementRemoved { kind, line } => write!(f, "line {line}: removed {kind}"),
            Self::LoopReplaced { line } => write!(f, "line {line}: dead loop replaced by its iterable"),
            Self::Hoisted {
                name,
                kind,
                line,
                loop_line,
            } => write!(
                f,
                "line {line}: hoisted {} `{name}` above loop at line {loop_line}",
                match kind {
                    HoistKind::Whole => "assignment",
                    HoistKind::Partial => "temporary",
                }
            ),
            Self::BindingPinned { name, line } => write!(f, "line {line}: kept binding of `{name}`"),
        }
    }
}

/// Hooks called by the optimizer passes.
///
/// All methods default to no-ops; implementations override the hooks they care about.
pub trait OptimizeTracer: fmt::Debug {
    /// Called before each fixpoint round.
    #[inline(always)]
    fn on_round_start(&mut self, _round: u32) {}

    /// Called after each fixpoint round.
    #[inline(always)]
    fn on_round_end(&mut self, _round: u32, _changed: bool) {}

    /// Called before a pass runs over the whole module.
    #[inline(always)]
    fn on_pass(&mut self, _pass: Pass, _round: u32) {}

    /// Called for each statement the dead-store pass deletes.
    ///
    /// Nested statements of a deleted compound statement are not reported separately.
    #[inline(always)]
    fn on_statement_removed(&mut self, _kind: &'static str, _line: u32) {}

    /// Called when a dead `for` loop is replaced by an expression statement evaluating its iterable.
    #[inline(always)]
    fn on_loop_replaced(&mut self, _line: u32) {}

    /// Called for each assignment or temporary moved above a loop.
    #[inline(always)]
    fn on_hoisted(&mut self, _name: &str, _kind: HoistKind, _line: u32, _loop_line: u32) {}

    /// Called when a dead binding is kept to preserve unbound-local behavior.
    #[inline(always)]
    fn on_binding_pinned(&mut self, _name: &str, _line: u32) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl OptimizeTracer for NoopTracer {}

/// Tracer that prints one line per event to stderr.
///
/// Output format:
/// ```text
/// round 1: start
///   line 3: removed assign
///   line 2: hoisted temporary `__o_tmp_2` above loop at line 2
/// round 1: changed
/// round 2: start
/// round 2: fixpoint
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Prefix for every line, e.g. the file being optimized.
    label: Option<String>,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that prefixes every line with `label`.
    #[must_use]
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }

    fn emit(&self, event: &OptimizeEvent) {
        let indent = match event {
            OptimizeEvent::RoundStart { .. } | OptimizeEvent::RoundEnd { .. } => "",
            _ => "  ",
        };
        match &self.label {
            Some(label) => eprintln!("{label}: {indent}{event}"),
            None => eprintln!("{indent}{event}"),
        }
    }
}

impl OptimizeTracer for StderrTracer {
    fn on_round_start(&mut self, round: u32) {
        self.emit(&OptimizeEvent::RoundStart { round });
    }

    fn on_round_end(&mut self, round: u32, changed: bool) {
        self.emit(&OptimizeEvent::RoundEnd { round, changed });
    }

    fn on_statement_removed(&mut self, kind: &'static str, line: u32) {
        self.emit(&OptimizeEvent::StatementRemoved { kind, line });
    }

    fn on_loop_replaced(&mut self, line: u32) {
        self.emit(&OptimizeEvent::LoopReplaced { line });
    }

    fn on_hoisted(&mut self, name: &str, kind: HoistKind, line: u32, loop_line: u32) {
        self.emit(&OptimizeEvent::Hoisted {
            name: name.to_owned(),
            kind,
            line,
            loop_line,
        });
    }

    fn on_binding_pinned(&mut self, name: &str, line: u32) {
        self.emit(&OptimizeEvent::BindingPinned {
            name: name.to_owned(),
            line,
        });
    }
}

/// Tracer that records every event in order.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<OptimizeEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[OptimizeEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<OptimizeEvent> {
        self.events
    }

    /// Number of rounds started.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, OptimizeEvent::RoundStart { .. }))
            .count()
    }
}

impl OptimizeTracer for RecordingTracer {
    fn on_round_start(&mut self, round: u32) {
        self.events.push(OptimizeEvent::RoundStart { round });
    }

    fn on_round_end(&mut self, round: u32, changed: bool) {
        self.events.push(OptimizeEvent::RoundEnd { round, changed });
    }

    fn on_pass(&mut self, pass: Pass, round: u32) {
        self.events.push(OptimizeEvent::PassRun { pass, round });
    }

    fn on_statement_removed(&mut self, kind: &'static str, line: u32) {
        self.events.push(OptimizeEvent::StatementRemoved { kind, line });
    }

    fn on_loop_replaced(&mut self, line: u32) {
        self.events.push(OptimizeEvent::LoopReplaced { line });
    }

    fn on_hoisted(&mut self, name: &str, kind: HoistKind, line: u32, loop_line: u32) {
        self.events.push(OptimizeEvent::Hoisted {
            name: name.to_owned(),
            kind,
            line,
            loop_line,
        });
    }

    fn on_binding_pinned(&mut self, name: &str, line: u32) {
        self.events.push(OptimizeEvent::BindingPinned {
            name: name.to_owned(),
            line,
        });
    }
}

/// Forwarding impl so a caller can lend a tracer to the optimizer and keep ownership.
impl<T: OptimizeTracer + ?Sized> OptimizeTracer for &mut T {
    fn on_round_start(&mut self, round: u32) {
        (**self).on_round_start(round);
    }

    fn on_round_end(&mut self, round: u32, changed: bool) {
        (**self).on_round_end(round, changed);
    }

    fn on_pass(&mut self, pass: Pass, round: u32) {
        (**self).on_pass(pass, round);
    }

    fn on_statement_removed(&mut self, kind: &'static str, line: u32) {
        (**self).on_statement_removed(kind, line);
    }

    fn on_loop_replaced(&mut self, line: u32) {
        (**self).on_loop_replaced(line);
    }

    fn on_hoisted(&mut self, name: &str, kind: HoistKind, line: u32, loop_line: u32) {
        (**self).on_hoisted(name, kind, line, loop_line);
    }

    fn on_binding_pinned(&mut self, name: &str, line: u32) {
        (**self).on_binding_pinned(name, line);
    }
}
