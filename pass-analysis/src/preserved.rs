use core::any::TypeId;

use smallvec::SmallVec;

/// Represents a set of analyses that are known to be preserved after a rewrite has been applied.
///
/// A pass builds one of these over the course of its execution, and hands it to
/// [crate::AnalysisManager::invalidate] once it finishes. The set only ever grows: there is no way
/// to un-preserve an analysis, construct a fresh set instead.
#[derive(Default, Debug, Clone)]
pub struct PreservedAnalyses {
    /// The set of explicitly preserved analysis type ids, kept sorted
    preserved: SmallVec<[TypeId; 8]>,
    /// Set when every analysis is preserved, independently of `preserved`
    all: bool,
}

impl PreservedAnalyses {
    /// Create a set which preserves every analysis
    pub fn all() -> Self {
        Self {
            preserved: SmallVec::new(),
            all: true,
        }
    }

    /// Mark all analyses as preserved.
    ///
    /// This is generally only useful when the IR is known not to have changed.
    pub fn preserve_all(&mut self) {
        self.all = true;
    }

    /// Mark the specified analysis type as preserved.
    pub fn preserve<A: 'static>(&mut self) {
        self.insert(TypeId::of::<A>());
    }

    /// Mark every analysis type in the tuple `S` as preserved, e.g.
    /// `preserve_many::<(ControlFlowGraph, DominanceInfo)>()`.
    pub fn preserve_many<S: AnalysisSet>(&mut self) {
        S::for_each_id(&mut |id| self.insert(id));
    }

    /// Mark a type as preserved using its raw [TypeId].
    ///
    /// Typically it is best to use [Self::preserve] instead, but this can be useful in cases
    /// where you can't express the type in Rust directly.
    pub fn preserve_raw(&mut self, id: TypeId) {
        self.insert(id);
    }

    /// Returns true if the specified type is preserved.
    ///
    /// This will return true if all analyses are marked preserved, even if the specified type was
    /// not explicitly preserved.
    pub fn is_preserved<A: 'static>(&self) -> bool {
        self.is_preserved_raw(&TypeId::of::<A>())
    }

    /// Returns true if the specified [TypeId] is marked preserved.
    ///
    /// This will return true if all analyses are marked preserved, even if the specified type was
    /// not explicitly preserved.
    pub fn is_preserved_raw(&self, id: &TypeId) -> bool {
        self.all || self.preserved.binary_search(id).is_ok()
    }

    /// Returns true if all analyses are preserved
    #[inline]
    pub fn is_all(&self) -> bool {
        self.all
    }

    /// Returns true if no analyses were marked preserved.
    ///
    /// NOTE: This is a literal check that no explicit analysis was preserved _and_ that
    /// [Self::preserve_all] was never called. It does not try to determine whether the set
    /// preserves anything that is actually cached.
    #[inline]
    pub fn is_none(&self) -> bool {
        !self.all && self.preserved.is_empty()
    }

    /// Returns the number of explicitly preserved analyses
    #[inline]
    pub fn len(&self) -> usize {
        self.preserved.len()
    }

    /// Returns true if no analyses were explicitly preserved
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.preserved.is_empty()
    }

    fn insert(&mut self, id: TypeId) {
        if let Err(index) = self.preserved.binary_search(&id) {
            self.preserved.insert(index, id);
        }
    }
}

/// A compile-time set of analysis types, expressed as a tuple.
///
/// This is implemented for tuples of up to eight `'static` types.
pub trait AnalysisSet {
    /// Invoke `f` with the [TypeId] of each type in this set
    fn for_each_id(f: &mut dyn FnMut(TypeId));
}

macro_rules! impl_analysis_set {
    ($($ty:ident),+) => {
        impl<$($ty: 'static),+> AnalysisSet for ($($ty,)+) {
            fn for_each_id(f: &mut dyn FnMut(TypeId)) {
                $(f(TypeId::of::<$ty>());)+
            }
        }
    };
}

impl_analysis_set!(A);
impl_analysis_set!(A, B);
impl_analysis_set!(A, B, C);
impl_analysis_set!(A, B, C, D);
impl_analysis_set!(A, B, C, D, E);
impl_analysis_set!(A, B, C, D, E, F);
impl_analysis_set!(A, B, C, D, E, F, G);
impl_analysis_set!(A, B, C, D, E, F, G, H);
