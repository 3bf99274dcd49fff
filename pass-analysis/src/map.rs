use alloc::rc::Rc;
use core::any::TypeId;

use smallvec::SmallVec;

use crate::{Analysis, FxHashMap, IrUnit, OperationAnalysis, PreservedAnalyses};

/// This represents the cache of analyses for a single IR unit.
///
/// There is at most one analysis of each type in the cache at any given time. The cache owns the
/// analyses it holds, handing out shared references to them; an analysis which has been evicted
/// lives on only as long as those references do.
pub(crate) struct AnalysisMap<U> {
    analyses: FxHashMap<TypeId, Rc<dyn OperationAnalysis>>,
    ir: U,
}

/// Analyses removed from an [AnalysisMap], dropped by the caller once it is safe to do so.
pub(crate) type Evicted = SmallVec<[Rc<dyn OperationAnalysis>; 4]>;

impl<U: IrUnit> AnalysisMap<U> {
    pub fn new(ir: U) -> Self {
        Self {
            analyses: Default::default(),
            ir,
        }
    }

    /// Returns the IR unit that this analysis map represents.
    #[inline]
    pub fn unit(&self) -> &U {
        &self.ir
    }

    /// Get a cached analysis instance if one exists, otherwise return `None`.
    pub fn get_cached<A>(&self) -> Option<Rc<A>>
    where
        A: Analysis,
    {
        let analysis = self.analyses.get(&TypeId::of::<A>())?;
        debug_assert!(analysis.is::<A>(), "analysis map keyed by wrong type id");
        Rc::clone(analysis).downcast::<A>()
    }

    /// Returns true if there is a cached analysis with the given id
    #[inline]
    pub fn contains(&self, id: &TypeId) -> bool {
        self.analyses.contains_key(id)
    }

    /// Returns the number of cached analyses
    #[inline]
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    /// Store a freshly computed analysis.
    ///
    /// If an analysis of the same type was stored while `analysis` was being computed, the
    /// existing one is kept, and returned, so that all requests observe the same instance.
    pub fn insert<A>(&mut self, analysis: Rc<A>) -> Rc<A>
    where
        A: Analysis,
    {
        use hashbrown::hash_map::Entry;

        match self.analyses.entry(TypeId::of::<A>()) {
            Entry::Vacant(entry) => {
                entry.insert(Rc::clone(&analysis) as Rc<dyn OperationAnalysis>);
                analysis
            }
            Entry::Occupied(entry) => {
                log::warn!(
                    target: "analysis-manager",
                    "'{}' for {:?} was computed re-entrantly, keeping the first result",
                    <A as Analysis>::name(),
                    &self.ir
                );
                Rc::clone(entry.get())
                    .downcast::<A>()
                    .unwrap_or_else(|| unreachable!("analysis map keyed by wrong type id"))
            }
        }
    }

    /// Remove all held analyses.
    pub fn clear(&mut self) -> Evicted {
        self.analyses.drain().map(|(_, analysis)| analysis).collect()
    }

    /// Remove any cached analyses which are invalidated by the given set of preserved analyses.
    ///
    /// Each analysis is queried independently, in no particular order.
    pub fn invalidate(&mut self, preserved_analyses: &PreservedAnalyses) -> Evicted {
        let mut evicted = Evicted::default();
        self.analyses.retain(|_, analysis| {
            if analysis.is_invalidated(preserved_analyses) {
                log::trace!(
                    target: "analysis-manager",
                    "invalidated '{}' for {:?}",
                    analysis.name(),
                    &self.ir
                );
                evicted.push(Rc::clone(analysis));
                false
            } else {
                true
            }
        });
        evicted
    }
}
