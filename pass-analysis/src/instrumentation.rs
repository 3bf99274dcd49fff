use alloc::boxed::Box;
use core::{any::TypeId, cell::RefCell, marker::PhantomData};

use smallvec::SmallVec;

use crate::IrUnit;

/// A [PassInstrumentation] is notified immediately before and after each analysis computation.
///
/// Cache hits are never reported, only actual computations, and each `run_before_analysis` is
/// followed by exactly one `run_after_analysis` for the same analysis. Computations may nest when
/// an analysis requests other analyses while it is being computed.
#[allow(unused_variables)]
pub trait PassInstrumentation<U: IrUnit> {
    fn run_before_analysis(&mut self, name: &str, id: &TypeId, unit: &U) {}
    fn run_after_analysis(&mut self, name: &str, id: &TypeId, unit: &U) {}
}

impl<U: IrUnit, P: ?Sized + PassInstrumentation<U>> PassInstrumentation<U> for Box<P> {
    fn run_before_analysis(&mut self, name: &str, id: &TypeId, unit: &U) {
        (**self).run_before_analysis(name, id, unit);
    }

    fn run_after_analysis(&mut self, name: &str, id: &TypeId, unit: &U) {
        (**self).run_after_analysis(name, id, unit);
    }
}

/// The [PassInstrumentor] is the sink shared by an entire analysis manager tree, it fans out each
/// notification to all of the registered [PassInstrumentation]s, in registration order.
pub struct PassInstrumentor<U: IrUnit> {
    instrumentations: RefCell<SmallVec<[Box<dyn PassInstrumentation<U>>; 1]>>,
}

impl<U: IrUnit> Default for PassInstrumentor<U> {
    fn default() -> Self {
        Self {
            instrumentations: Default::default(),
        }
    }
}

impl<U: IrUnit> PassInstrumentor<U> {
    pub fn run_before_analysis(&self, name: &str, id: &TypeId, unit: &U) {
        self.instrument(|pi| pi.run_before_analysis(name, id, unit));
    }

    pub fn run_after_analysis(&self, name: &str, id: &TypeId, unit: &U) {
        self.instrument(|pi| pi.run_after_analysis(name, id, unit));
    }

    pub fn add_instrumentation(&self, pi: Box<dyn PassInstrumentation<U>>) {
        self.instrumentations.borrow_mut().push(pi);
    }

    /// Returns the number of registered instrumentations
    pub fn len(&self) -> usize {
        self.instrumentations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrumentations.borrow().is_empty()
    }

    #[inline(always)]
    fn instrument<F>(&self, callback: F)
    where
        F: Fn(&mut dyn PassInstrumentation<U>),
    {
        let mut instrumentations = self.instrumentations.borrow_mut();
        for pi in instrumentations.iter_mut() {
            callback(pi);
        }
    }
}

/// A [PassInstrumentation] which emits a `debug` log record, with target `analysis`, around each
/// analysis computation.
pub struct LoggingInstrumentation<U> {
    depth: usize,
    _marker: PhantomData<fn(&U)>,
}

impl<U> Default for LoggingInstrumentation<U> {
    fn default() -> Self {
        Self {
            depth: 0,
            _marker: PhantomData,
        }
    }
}

impl<U: IrUnit> PassInstrumentation<U> for LoggingInstrumentation<U> {
    fn run_before_analysis(&mut self, name: &str, _id: &TypeId, unit: &U) {
        let indent = self.depth * 2;
        log::debug!(target: "analysis", "{:indent$}computing '{name}' for {unit:?}", "");
        self.depth += 1;
    }

    fn run_after_analysis(&mut self, name: &str, _id: &TypeId, unit: &U) {
        self.depth = self.depth.saturating_sub(1);
        let indent = self.depth * 2;
        log::debug!(target: "analysis", "{:indent$}computed '{name}' for {unit:?}", "");
    }
}
