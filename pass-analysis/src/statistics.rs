use alloc::{rc::Rc, vec::Vec};
use core::{any::TypeId, cell::RefCell, fmt};

use compact_str::CompactString;

use crate::{FxHashMap, IrUnit, PassInstrumentation};

/// Statistics collected about a single kind of analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisStatistic {
    /// The display name of the analysis
    pub name: CompactString,
    /// The number of times the analysis was computed, i.e. excluding cache hits
    pub computations: usize,
    /// The cumulative wall-clock time spent computing the analysis, including time spent in any
    /// analyses it requested in turn
    #[cfg(feature = "std")]
    pub elapsed: std::time::Duration,
}

#[derive(Default)]
struct StatisticsState {
    stats: FxHashMap<TypeId, AnalysisStatistic>,
    #[cfg(feature = "std")]
    running: Vec<(TypeId, std::time::Instant)>,
    #[cfg(not(feature = "std"))]
    running: Vec<TypeId>,
}

/// A [PassInstrumentation] which records how often each analysis is computed.
///
/// This is a cheap handle to shared state: register one clone with a
/// [crate::PassInstrumentor], and keep another around to query the results.
#[derive(Default, Clone)]
pub struct AnalysisStatistics {
    state: Rc<RefCell<StatisticsState>>,
}

impl AnalysisStatistics {
    /// Returns the number of times the analysis `A` was computed
    pub fn computations<A: 'static>(&self) -> usize {
        self.computations_raw(&TypeId::of::<A>())
    }

    /// Returns the number of times the analysis with the given [TypeId] was computed
    pub fn computations_raw(&self, id: &TypeId) -> usize {
        self.state.borrow().stats.get(id).map(|stat| stat.computations).unwrap_or(0)
    }

    /// Returns the total number of analysis computations observed
    pub fn total_computations(&self) -> usize {
        self.state.borrow().stats.values().map(|stat| stat.computations).sum()
    }

    /// Returns true if an analysis computation is currently in progress
    pub fn is_computing(&self) -> bool {
        !self.state.borrow().running.is_empty()
    }

    /// Get a snapshot of the statistics collected so far, sorted by analysis name
    pub fn snapshot(&self) -> Vec<AnalysisStatistic> {
        let mut stats = self.state.borrow().stats.values().cloned().collect::<Vec<_>>();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Discard all statistics collected so far
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.stats.clear();
        state.running.clear();
    }
}

impl<U: IrUnit> PassInstrumentation<U> for AnalysisStatistics {
    fn run_before_analysis(&mut self, _name: &str, id: &TypeId, _unit: &U) {
        let mut state = self.state.borrow_mut();
        #[cfg(feature = "std")]
        state.running.push((*id, std::time::Instant::now()));
        #[cfg(not(feature = "std"))]
        state.running.push(*id);
    }

    fn run_after_analysis(&mut self, name: &str, id: &TypeId, _unit: &U) {
        let mut state = self.state.borrow_mut();
        #[cfg(feature = "std")]
        let elapsed = match state.running.pop() {
            Some((started_id, started)) => {
                debug_assert_eq!(&started_id, id, "mismatched analysis instrumentation events");
                started.elapsed()
            }
            None => std::time::Duration::ZERO,
        };
        #[cfg(not(feature = "std"))]
        {
            let started_id = state.running.pop();
            debug_assert_eq!(
                started_id.as_ref(),
                Some(id),
                "mismatched analysis instrumentation events"
            );
        }

        let stat = state.stats.entry(*id).or_insert_with(|| AnalysisStatistic {
            name: CompactString::new(name),
            computations: 0,
            #[cfg(feature = "std")]
            elapsed: std::time::Duration::ZERO,
        });
        stat.computations += 1;
        #[cfg(feature = "std")]
        {
            stat.elapsed += elapsed;
        }
    }
}

impl fmt::Display for AnalysisStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis statistics:")?;
        for stat in self.snapshot() {
            write!(f, "  {}: {} computation(s)", stat.name, stat.computations)?;
            #[cfg(feature = "std")]
            write!(f, " in {:?}", stat.elapsed)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
