//! The optimizer entry points and the fixpoint driver.
//!
//! Every entry point validates the tree, then runs its passes in rounds until a round leaves the tree
//! unchanged. A round only looks at the tree the previous round produced.

use crate::{
    dead_store::eliminate_dead_stores,
    error::OptimizeError,
    hoist::hoist_loop_invariants,
    parse::parse,
    purity::PurityTable,
    render::render,
    scope::validate,
    tracer::{NoopTracer, OptimizeTracer, Pass},
    tree::Module,
};

/// Default ceiling on fixpoint rounds.
///
/// Every pass only ever removes statements or moves computations outward, so real inputs settle in a
/// handful of rounds; hitting the ceiling means an analysis bug.
pub const DEFAULT_MAX_ROUNDS: u32 = 32;

/// Configuration for an [`Optimizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOptions {
    /// Maximum number of rounds before [`OptimizeError::NoFixpoint`] is returned.
    pub max_rounds: u32,
    /// Calls the passes may treat as side-effect free.
    pub purity: PurityTable,
    /// Run dead-store elimination in [`Optimizer::optimize`].
    pub remove_useless: bool,
    /// Run loop-invariant hoisting in [`Optimizer::optimize`].
    pub hoist_invariants: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            purity: PurityTable::default(),
            remove_useless: true,
            hoist_invariants: true,
        }
    }
}

impl OptimizeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub fn with_purity(mut self, purity: PurityTable) -> Self {
        self.purity = purity;
        self
    }

    #[must_use]
    pub fn with_remove_useless(mut self, enabled: bool) -> Self {
        self.remove_useless = enabled;
        self
    }

    #[must_use]
    pub fn with_hoist_invariants(mut self, enabled: bool) -> Self {
        self.hoist_invariants = enabled;
        self
    }
}

/// Runs the optimization passes over trees, reporting to a tracer.
///
/// The tracer is a type parameter so the default [`NoopTracer`] costs nothing.
#[derive(Debug)]
pub struct Optimizer<Tr = NoopTracer> {
    options: OptimizeOptions,
    tracer: Tr,
}

impl Optimizer<NoopTracer> {
    #[must_use]
    pub fn new(options: OptimizeOptions) -> Self {
        Self {
            options,
            tracer: NoopTracer,
        }
    }
}

impl Default for Optimizer<NoopTracer> {
    fn default() -> Self {
        Self::new(OptimizeOptions::default())
    }
}

impl<Tr: OptimizeTracer> Optimizer<Tr> {
    /// Replaces the tracer, keeping the options.
    #[must_use]
    pub fn with_tracer<T: OptimizeTracer>(self, tracer: T) -> Optimizer<T> {
        Optimizer {
            options: self.options,
            tracer,
        }
    }

    #[must_use]
    pub fn options(&self) -> &OptimizeOptions {
        &self.options
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Removes dead stores and dead statements from every scope of `module`.
    pub fn remove_useless(&mut self, module: Module) -> Result<Module, OptimizeError> {
        self.run(module, true, false)
    }

    /// Moves loop-invariant computations above their loops in every scope of `module`.
    pub fn hoist_invariants(&mut self, module: Module) -> Result<Module, OptimizeError> {
        self.run(module, false, true)
    }

    /// Alternates the enabled passes until the tree stops changing.
    pub fn optimize(&mut self, module: Module) -> Result<Module, OptimizeError> {
        self.run(module, self.options.remove_useless, self.options.hoist_invariants)
    }

    /// Parses `source`, optimizes it and renders the result.
    pub fn optimize_source(&mut self, source: &str) -> Result<String, OptimizeError> {
        let module = self.optimize(parse(source)?)?;
        Ok(render(&module))
    }

    fn run(&mut self, mut module: Module, dead_stores: bool, hoisting: bool) -> Result<Module, OptimizeError> {
        validate(&module)?;
        let max_rounds = self.options.max_rounds.max(1);
        for round in 1..=max_rounds {
            self.tracer.on_round_start(round);
            let before = module.clone();
            if dead_stores {
                self.tracer.on_pass(Pass::RemoveUseless, round);
                eliminate_dead_stores(&mut module, &self.options.purity, &mut self.tracer);
            }
            if hoisting {
                self.tracer.on_pass(Pass::HoistInvariants, round);
                hoist_loop_invariants(&mut module, &self.options.purity, &mut self.tracer);
            }
            let changed = module != before;
            self.tracer.on_round_end(round, changed);
            if !changed {
                return Ok(module);
            }
        }
        Err(OptimizeError::NoFixpoint { rounds: max_rounds })
    }
}

/// Removes dead stores with the default options.
pub fn remove_useless(module: Module) -> Result<Module, OptimizeError> {
    Optimizer::default().remove_useless(module)
}

/// Hoists loop invariants with the default options.
pub fn hoist_invariants(module: Module) -> Result<Module, OptimizeError> {
    Optimizer::default().hoist_invariants(module)
}

/// Runs both passes to a fixpoint with the default options.
pub fn optimize(module: Module) -> Result<Module, OptimizeError> {
    Optimizer::default().optimize(module)
}

/// Parses, optimizes and renders `source` with the default options.
pub fn optimize_source(source: &str) -> Result<String, OptimizeError> {
    Optimizer::default().optimize_source(source)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tracer::RecordingTracer;

    #[test]
    fn round_ceiling_is_an_internal_error() {
        let module = parse("def f():\n    x = 1\n").unwrap();
        let mut optimizer = Optimizer::new(OptimizeOptions::new().with_max_rounds(1));
        assert_eq!(
            optimizer.optimize(module.clone()),
            Err(OptimizeError::NoFixpoint { rounds: 1 })
        );
        let mut optimizer = Optimizer::new(OptimizeOptions::new().with_max_rounds(2));
        let optimized = optimizer.optimize(module).unwrap();
        assert_eq!(render(&optimized), "def f():\n    pass\n");
    }

    #[test]
    fn disabled_passes_do_not_run() {
        let source = "def f(a, x, y):\n    unused = 1\n    for i in a: a[i] = x + y\n";
        let mut optimizer = Optimizer::new(OptimizeOptions::new().with_hoist_invariants(false));
        assert_eq!(
            optimizer.optimize_source(source).unwrap(),
            "def f(a, x, y):\n    for i in a:\n        a[i] = x + y\n"
        );
        let mut optimizer = Optimizer::new(OptimizeOptions::new().with_remove_useless(false));
        assert_eq!(
            optimizer.optimize_source(source).unwrap(),
            "def f(a, x, y):\n    unused = 1\n    __o_tmp_3 = x + y\n    for i in a:\n        a[i] = __o_tmp_3\n"
        );
    }

    #[test]
    fn rounds_are_traced() {
        let mut optimizer = Optimizer::default().with_tracer(RecordingTracer::new());
        optimizer.optimize_source("def f():\n    x = 1\n    return 2\n").unwrap();
        let tracer = optimizer.into_tracer();
        assert_eq!(tracer.rounds(), 2);
        assert!(tracer.events().contains(&crate::tracer::OptimizeEvent::RoundEnd {
            round: 2,
            changed: false
        }));
    }

    #[test]
    fn validation_runs_first() {
        let module = parse("nonlocal x\n").unwrap();
        assert!(matches!(optimize(module), Err(OptimizeError::Validation(_))));
    }
}
