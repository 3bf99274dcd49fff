use core::{fmt, hash::Hash};

/// An [IrUnit] is a node of the IR tree against which analyses are computed, e.g. a module, a
/// function, or some other operation which contains nested operations.
///
/// The analysis manager never creates or destroys IR; it only needs three things from it:
///
/// * A stable identity, via `Eq + Hash`, so that units can be used as cache keys
/// * A way to navigate to the unit which encloses this one, via [IrUnit::parent_unit]
/// * A way to render the unit in diagnostics, via `Debug`
///
/// Implementations are expected to be cheap handles (e.g. a reference-counted pointer), as the
/// analysis manager clones them freely.
pub trait IrUnit: Clone + Eq + Hash + fmt::Debug + 'static {
    /// Returns the unit which immediately encloses `self`, or `None` if `self` is a root.
    fn parent_unit(&self) -> Option<Self>;

    /// Returns true if `self` is a strict ancestor of `other`.
    fn is_proper_ancestor_of(&self, other: &Self) -> bool {
        let mut next = other.parent_unit();
        while let Some(ancestor) = next {
            if &ancestor == self {
                return true;
            }
            next = ancestor.parent_unit();
        }
        false
    }
}

/// An [AnalysisTarget] is a specific kind of [IrUnit] that an analysis can be computed for.
///
/// Every [IrUnit] is trivially a target for itself. More specific targets, such as a function
/// operation, implement this trait to provide a checked down-cast from the generic unit handle.
pub trait AnalysisTarget<U: IrUnit>: Sized + 'static {
    /// Try to view `unit` as `Self`, returning `None` if `unit` is not of this kind.
    fn try_from_unit(unit: &U) -> Option<Self>;

    /// A display name for this target kind, used in diagnostics
    fn target_name() -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl<U: IrUnit> AnalysisTarget<U> for U {
    #[inline(always)]
    fn try_from_unit(unit: &U) -> Option<Self> {
        Some(unit.clone())
    }
}

/// Convert `unit` to the target type `T`.
///
/// NOTE: This will panic if `unit` is not a `T`.
#[inline]
#[track_caller]
pub(crate) fn into_target<U, T>(unit: &U) -> T
where
    U: IrUnit,
    T: AnalysisTarget<U>,
{
    T::try_from_unit(unit).unwrap_or_else(|| expected_target::<U, T>(unit))
}

#[cold]
#[inline(never)]
#[track_caller]
fn expected_target<U, T>(unit: &U) -> !
where
    U: IrUnit,
    T: AnalysisTarget<U>,
{
    panic!("expected {unit:?} to be a `{}`", T::target_name())
}
