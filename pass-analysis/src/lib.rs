//! Caching and invalidation of analyses computed over a tree of IR units.
//!
//! Passes request analyses of the unit they run on, or of units nested within it, from an
//! [AnalysisManager]. Each analysis is computed at most once per unit, and then cached until it is
//! invalidated. When a pass finishes, it declares which analyses it preserved in a
//! [PreservedAnalyses] set, and the pass driver calls [AnalysisManager::invalidate] with that set
//! to evict everything else.
//!
//! The analysis caches mirror the structure of the IR: the [ModuleAnalysisManager] owns the cache
//! of the top-level unit, and caches for nested units are created on demand the first time they
//! are requested.
#![no_std]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod analysis;
mod error;
mod instrumentation;
mod ir;
mod manager;
mod map;
mod preserved;
mod statistics;
mod tree;


pub use self::{
    analysis::{Analysis, OperationAnalysis, analysis_name},
    error::AnalysisError,
    instrumentation::{LoggingInstrumentation, PassInstrumentation, PassInstrumentor},
    ir::{AnalysisTarget, IrUnit},
    manager::{AnalysisManager, ModuleAnalysisManager, ResetAnalysesOnDrop},
    preserved::{AnalysisSet, PreservedAnalyses},
    statistics::{AnalysisStatistic, AnalysisStatistics},
};

pub(crate) type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
