use alloc::{format, rc::Rc};
use core::{any::TypeId, fmt};

use smallvec::SmallVec;

use crate::{
    Analysis, AnalysisError, AnalysisTarget, IrUnit, PassInstrumentor, PreservedAnalyses,
    tree::{AnalysisTree, NestedMapKey},
};

/// An [AnalysisManager] is the primary entrypoint for performing analysis on a specific IR unit
/// instance that it is constructed for.
///
/// It is used to manage and cache analyses for the unit, as well as those of child units, via
/// nested [AnalysisManager] instances.
///
/// This type is a thin wrapper around a reference, and is meant to be passed by value. It owns
/// nothing, and borrows from the [ModuleAnalysisManager] at the root of the tree, so it can never
/// outlive it. It is not safe to use an [AnalysisManager] for a unit whose analyses were released
/// by clearing one of its ancestors; doing so will panic.
///
/// The analysis manager is single-threaded. Drivers which process sibling units concurrently
/// must give each thread its own tree, or serialize access externally.
pub struct AnalysisManager<'a, U: IrUnit> {
    tree: &'a AnalysisTree<U>,
    key: NestedMapKey,
}

impl<U: IrUnit> Copy for AnalysisManager<'_, U> {}
impl<U: IrUnit> Clone for AnalysisManager<'_, U> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<U: IrUnit> Eq for AnalysisManager<'_, U> {}
impl<U: IrUnit> PartialEq for AnalysisManager<'_, U> {
    /// Two analysis managers are equal if they manage the same analysis cache
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.key == other.key
    }
}

impl<U: IrUnit> fmt::Debug for AnalysisManager<'_, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisManager").field("key", &self.key).finish_non_exhaustive()
    }
}

impl<'a, U: IrUnit> AnalysisManager<'a, U> {
    #[inline(always)]
    pub(crate) fn new(tree: &'a AnalysisTree<U>, key: NestedMapKey) -> Self {
        Self { tree, key }
    }

    /// Returns the IR unit this analysis manager manages analyses for
    #[track_caller]
    pub fn unit(&self) -> U {
        self.tree.unit(self.key)
    }

    /// Returns the analysis manager of the enclosing unit, or `None` at the root.
    #[track_caller]
    pub fn parent(&self) -> Option<AnalysisManager<'a, U>> {
        self.tree.parent(self.key).map(|key| Self::new(self.tree, key))
    }

    /// Query for a cached analysis on the given ancestor unit. The analysis may not exist and if
    /// it does it may be out-of-date.
    ///
    /// Only strict ancestors are considered, the current unit is never.
    #[track_caller]
    pub fn get_cached_parent_analysis<A>(&self, parent: &U) -> Option<Rc<A>>
    where
        A: Analysis<Unit = U>,
    {
        let mut current_parent = self.tree.parent(self.key);
        while let Some(parent_key) = current_parent.take() {
            if &self.tree.unit(parent_key) == parent {
                return self.tree.get_cached::<A>(parent_key);
            }
            current_parent = self.tree.parent(parent_key);
        }
        None
    }

    /// Query for the given analysis for the current unit.
    #[track_caller]
    pub fn get_analysis<A>(&self) -> Rc<A>
    where
        A: Analysis<Unit = U, Target = U>,
    {
        self.tree.get_or_compute::<A>(self.key)
    }

    /// Query for the given analysis for the current unit, of a specific derived kind `O`.
    ///
    /// NOTE: This will panic if the current unit is not of kind `O`.
    #[track_caller]
    pub fn get_analysis_for<A, O>(&self) -> Rc<A>
    where
        A: Analysis<Unit = U, Target = O>,
        O: AnalysisTarget<U>,
    {
        self.tree.get_or_compute::<A>(self.key)
    }

    /// Same as [Self::get_analysis_for], but returns an error if the current unit is not of kind
    /// `O`, rather than panicking.
    #[track_caller]
    pub fn try_get_analysis_for<A, O>(&self) -> Result<Rc<A>, AnalysisError>
    where
        A: Analysis<Unit = U, Target = O>,
        O: AnalysisTarget<U>,
    {
        self.tree.try_get_or_compute::<A>(self.key)
    }

    /// Query for a cached entry of the given analysis on the current unit.
    #[track_caller]
    pub fn get_cached_analysis<A>(&self) -> Option<Rc<A>>
    where
        A: Analysis<Unit = U>,
    {
        self.tree.get_cached::<A>(self.key)
    }

    /// Returns true if the analysis `A` is cached for the current unit
    #[track_caller]
    pub fn is_cached<A: 'static>(&self) -> bool {
        self.tree.is_cached(self.key, &TypeId::of::<A>())
    }

    /// Returns the number of analyses cached for the current unit
    #[track_caller]
    pub fn num_cached(&self) -> usize {
        self.tree.num_cached(self.key)
    }

    /// Query for an analysis of a child unit, constructing it if necessary.
    #[track_caller]
    pub fn get_child_analysis<A>(&self, child: &U) -> Rc<A>
    where
        A: Analysis<Unit = U, Target = U>,
    {
        self.nest(child).get_analysis::<A>()
    }

    /// Query for an analysis of a child unit of a specific derived kind, constructing it if
    /// necessary.
    ///
    /// NOTE: This will panic if `child` is not of kind `O`.
    #[track_caller]
    pub fn get_child_analysis_for<A, O>(&self, child: &U) -> Rc<A>
    where
        A: Analysis<Unit = U, Target = O>,
        O: AnalysisTarget<U>,
    {
        self.nest(child).get_analysis_for::<A, O>()
    }

    /// Query for a cached analysis of a child unit, or return `None`.
    ///
    /// This never allocates a nested analysis manager for `child`.
    ///
    /// NOTE: This will panic if `child` is not an immediate child of the current unit.
    #[track_caller]
    pub fn get_cached_child_analysis<A>(&self, child: &U) -> Option<Rc<A>>
    where
        A: Analysis<Unit = U>,
    {
        match self.try_get_cached_child_analysis::<A>(child) {
            Ok(analysis) => analysis,
            Err(err) => panic!("invalid child: {err}"),
        }
    }

    /// Same as [Self::get_cached_child_analysis], but returns an error if `child` is not an
    /// immediate child of the current unit, rather than panicking.
    #[track_caller]
    pub fn try_get_cached_child_analysis<A>(
        &self,
        child: &U,
    ) -> Result<Option<Rc<A>>, AnalysisError>
    where
        A: Analysis<Unit = U>,
    {
        let current = self.unit();
        if child.parent_unit().as_ref() != Some(&current) {
            return Err(AnalysisError::NotAChild {
                unit: format!("{child:?}"),
                parent: format!("{current:?}"),
            });
        }
        Ok(self.tree.child(self.key, child).and_then(|child| self.tree.get_cached::<A>(child)))
    }

    /// Get an analysis manager for the given unit, which must be a proper descendant of the
    /// current unit represented by this analysis manager.
    ///
    /// Analysis managers for `unit` and any intermediate units are created on demand.
    ///
    /// NOTE: This will panic if `unit` is not a proper descendant of the current unit.
    #[track_caller]
    pub fn nest(&self, unit: &U) -> AnalysisManager<'a, U> {
        match self.try_nest(unit) {
            Ok(manager) => manager,
            Err(err) => panic!("invalid nesting: {err}"),
        }
    }

    /// Same as [Self::nest], but returns an error if `unit` is not a proper descendant of the
    /// current unit, rather than panicking.
    #[track_caller]
    pub fn try_nest(&self, unit: &U) -> Result<AnalysisManager<'a, U>, AnalysisError> {
        let current = self.unit();
        if !current.is_proper_ancestor_of(unit) {
            return Err(AnalysisError::NotADescendant {
                unit: format!("{unit:?}"),
                ancestor: format!("{current:?}"),
            });
        }

        // Collect all ancestors up to, but not including, the current unit
        let mut ancestors = SmallVec::<[U; 4]>::default();
        let mut next = Some(unit.clone());
        while let Some(ancestor) = next.take() {
            if ancestor == current {
                break;
            }
            next = ancestor.parent_unit();
            ancestors.push(ancestor);
        }

        let mut key = self.key;
        while let Some(unit) = ancestors.pop() {
            key = self.tree.nest_immediate(key, unit);
        }
        Ok(Self::new(self.tree, key))
    }

    /// Returns the number of nested analysis managers which have been created for immediate
    /// children of the current unit.
    #[track_caller]
    pub fn num_nested(&self) -> usize {
        self.tree.num_children(self.key)
    }

    /// Invalidate any non preserved analyses of the current unit.
    ///
    /// This does not affect the analyses of nested units, it is up to the caller to decide how
    /// invalidation should be propagated to them.
    #[inline]
    #[track_caller]
    pub fn invalidate(&self, preserved_analyses: &PreservedAnalyses) {
        self.tree.invalidate(self.key, preserved_analyses);
    }

    /// Clear all held analyses of the current unit, and release the analysis managers of all
    /// nested units.
    #[inline]
    #[track_caller]
    pub fn clear(&self) {
        self.tree.clear(self.key);
    }

    /// Clear any held analyses when the returned guard is dropped.
    #[inline]
    pub fn defer_clear(&self) -> ResetAnalysesOnDrop<'a, U> {
        ResetAnalysesOnDrop { manager: *self }
    }

    /// Returns a [PassInstrumentor] for the current unit, if one was installed.
    #[inline]
    #[track_caller]
    pub fn pass_instrumentor(&self) -> Option<Rc<PassInstrumentor<U>>> {
        self.tree.pass_instrumentor(self.key)
    }
}

#[must_use]
#[doc(hidden)]
pub struct ResetAnalysesOnDrop<'a, U: IrUnit> {
    manager: AnalysisManager<'a, U>,
}

impl<U: IrUnit> Drop for ResetAnalysesOnDrop<'_, U> {
    fn drop(&mut self) {
        // The analyses may have already been released by clearing an ancestor
        if self.manager.tree.is_live(self.manager.key) {
            self.manager.clear();
        }
    }
}

/// An analysis manager for the top-level IR unit, e.g. a module.
///
/// This owns the storage for the analyses of the top-level unit and all nested units, and is the
/// anchor from which [AnalysisManager]s are obtained. Dropping it drops every cached analysis.
pub struct ModuleAnalysisManager<U: IrUnit> {
    tree: AnalysisTree<U>,
}

impl<U: IrUnit> ModuleAnalysisManager<U> {
    /// Create a new [ModuleAnalysisManager] for `unit`, with an optional instrumentor that will
    /// be notified of all analysis computations anywhere in the tree.
    pub fn new(unit: U, instrumentor: Option<Rc<PassInstrumentor<U>>>) -> Self {
        Self {
            tree: AnalysisTree::new(unit, instrumentor),
        }
    }

    /// Returns an analysis manager for the top-level unit
    #[inline]
    pub fn as_analysis_manager(&self) -> AnalysisManager<'_, U> {
        AnalysisManager::new(&self.tree, self.tree.root())
    }

    /// Returns the top-level unit
    pub fn unit(&self) -> U {
        self.tree.unit(self.tree.root())
    }

    /// Returns the number of analysis managers currently allocated, including the top-level one
    pub fn num_managers(&self) -> usize {
        self.tree.len()
    }
}

impl<'a, U: IrUnit> From<&'a ModuleAnalysisManager<U>> for AnalysisManager<'a, U> {
    #[inline]
    fn from(module: &'a ModuleAnalysisManager<U>) -> Self {
        module.as_analysis_manager()
    }
}

impl<U: IrUnit> fmt::Debug for ModuleAnalysisManager<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleAnalysisManager")
            .field("unit", &self.unit())
            .field("managers", &self.tree.len())
            .finish()
    }
}
