use alloc::rc::Rc;
use core::any::{Any, TypeId};

use crate::{AnalysisManager, AnalysisTarget, IrUnit, PreservedAnalyses};

/// The [Analysis] trait is used to define an analysis over some IR unit.
///
/// Analyses must be default-constructible, and `Sized + 'static` to support downcasting.
///
/// An analysis, when requested, is first constructed via its `Default` implementation, and then
/// [Analysis::analyze] is called on the target in order to compute the analysis results. The
/// analysis type also acts as storage for the analysis results.
///
/// When the IR is changed, analyses are invalidated by default, unless they are specifically
/// preserved via the [PreservedAnalyses] set. When an analysis is being asked if it should be
/// invalidated, via [Analysis::is_invalidated], it has the opportunity to identify if it actually
/// needs to be invalidated based on what analyses were preserved. If the analyses this one was
/// derived from are still valid, it may be able to preserve itself as well, and avoid redundant
/// recomputation.
pub trait Analysis: Default + Any {
    /// The kind of IR unit this analysis is cached against
    type Unit: IrUnit;

    /// The specific type on which this analysis is performed.
    ///
    /// This is either [Self::Unit] itself, or a more specific kind of unit which can be obtained
    /// from it via a checked down-cast.
    type Target: AnalysisTarget<Self::Unit>;

    /// Returns the display name for this analysis
    ///
    /// By default this is derived from the name of the concrete implementation type, see
    /// [analysis_name].
    fn name() -> &'static str {
        analysis_name::<Self>()
    }

    /// Analyze `target` using the provided [AnalysisManager].
    ///
    /// The analysis manager is the one for `target`, and may be used to request other analyses
    /// for `target`, for its children, or cached analyses of its ancestors.
    fn analyze(&mut self, target: &Self::Target, analysis_manager: AnalysisManager<'_, Self::Unit>);

    /// Query this analysis for invalidation.
    ///
    /// Given a preserved analysis set, returns true if it should truly be invalidated. The default
    /// implementation only checks whether this analysis was itself preserved, but an analysis
    /// may override this to, for example, remain valid as long as some coarser analysis it was
    /// derived from is preserved.
    fn is_invalidated(&self, preserved_analyses: &PreservedAnalyses) -> bool {
        !preserved_analyses.is_preserved::<Self>()
    }
}

/// A type-erased [Analysis].
///
/// This is automatically derived for all [Analysis] implementations, and is the means by which
/// the analysis cache abstracts over the heterogenous set of analyses it holds. Only invalidation
/// is dispatched dynamically, everything else exists to get back to the concrete type.
pub trait OperationAnalysis {
    /// The unique type id of this analysis
    fn analysis_id(&self) -> TypeId;

    /// Used for dynamic casting to the underlying [Analysis] type
    fn as_any(&self) -> &dyn Any;

    /// Used for dynamic casting to the underlying [Analysis] type
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;

    /// The name of this analysis
    fn name(&self) -> &'static str;

    /// Query this analysis for invalidation.
    ///
    /// See [Analysis::is_invalidated].
    fn is_invalidated(&self, preserved_analyses: &PreservedAnalyses) -> bool;
}

impl dyn OperationAnalysis {
    /// Cast a reference-counted handle to this analysis to its concrete implementation type.
    ///
    /// Returns `None` if the underlying analysis is not of type `T`
    #[inline]
    pub fn downcast<T: 'static>(self: Rc<Self>) -> Option<Rc<T>> {
        self.as_any_rc().downcast::<T>().ok()
    }

    /// Returns true if the underlying analysis is of type `T`
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl<A> OperationAnalysis for A
where
    A: Analysis,
{
    #[inline]
    fn analysis_id(&self) -> TypeId {
        TypeId::of::<A>()
    }

    #[inline(always)]
    fn as_any(&self) -> &dyn Any {
        self as &dyn Any
    }

    #[inline(always)]
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self as Rc<dyn Any>
    }

    #[inline]
    fn name(&self) -> &'static str {
        <A as Analysis>::name()
    }

    #[inline]
    fn is_invalidated(&self, preserved_analyses: &PreservedAnalyses) -> bool {
        <A as Analysis>::is_invalidated(self, preserved_analyses)
    }
}

/// Derive a readable display name for the analysis type `A`.
///
/// This is the fully-qualified type name of `A`, with the leading crate path removed when `A` is
/// defined in one of the compiler's own `midenc_*` crates. The result is only ever used for
/// display purposes, it has no bearing on how analyses are cached.
pub fn analysis_name<A: ?Sized>() -> &'static str {
    strip_crate_prefix(core::any::type_name::<A>())
}

fn strip_crate_prefix(name: &'static str) -> &'static str {
    if !name.starts_with("midenc_") {
        return name;
    }
    match name.split_once("::") {
        // Only strip a crate path, not the name of a generic parameter
        Some((krate, rest)) if !krate.contains('<') => rest,
        _ => name,
    }
}
