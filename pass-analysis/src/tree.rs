use alloc::{rc::Rc, vec::Vec};
use core::{any::TypeId, cell::RefCell};

use cranelift_entity::{PrimaryMap, entity_impl};
use smallvec::SmallVec;

use crate::{
    Analysis, AnalysisError, AnalysisManager, AnalysisTarget, FxHashMap, IrUnit, PassInstrumentor,
    PreservedAnalyses, ir::into_target, map::AnalysisMap,
};

/// The index of a [NestedAnalysisMap] slot in an [AnalysisTree]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NestedMapId(u32);
entity_impl!(NestedMapId, "map");

/// A handle to a live [NestedAnalysisMap] in an [AnalysisTree].
///
/// Slots are reused once the map occupying them is released, so the key carries the generation
/// of the slot it was issued for, which lets us detect handles that outlived their map.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct NestedMapKey {
    id: NestedMapId,
    generation: u32,
}

/// Every map is either the root of the tree, in which case it holds the optional instrumentor
/// shared by the whole tree, or has a parent map.
enum MapLink<U: IrUnit> {
    Root(Option<Rc<PassInstrumentor<U>>>),
    Child(NestedMapKey),
}

/// An analysis map that contains a map for the current IR unit, and a set of maps for any child
/// units.
struct NestedAnalysisMap<U: IrUnit> {
    link: MapLink<U>,
    analyses: AnalysisMap<U>,
    /// Child maps are created on demand, never eagerly
    children: FxHashMap<U, NestedMapKey>,
}

impl<U: IrUnit> NestedAnalysisMap<U> {
    fn new(unit: U, link: MapLink<U>) -> Self {
        Self {
            link,
            analyses: AnalysisMap::new(unit),
            children: Default::default(),
        }
    }
}

struct Slot<U: IrUnit> {
    generation: u32,
    map: Option<NestedAnalysisMap<U>>,
}

/// The storage for a tree of [NestedAnalysisMap]s mirroring the structure of the IR.
///
/// All maps live in a single arena, and refer to their parent and children by key, so releasing a
/// subtree is a single worklist sweep over its maps rather than a chain of recursive drops.
///
/// Interior mutability is used so that [AnalysisManager] can be a shared, copyable handle. No
/// borrow of the arena is ever held while running code outside of this module, e.g. while an
/// analysis is being computed, so analyses are free to request other analyses.
pub(crate) struct AnalysisTree<U: IrUnit> {
    maps: RefCell<PrimaryMap<NestedMapId, Slot<U>>>,
    free: RefCell<Vec<NestedMapId>>,
    root: NestedMapKey,
}

impl<U: IrUnit> AnalysisTree<U> {
    pub fn new(unit: U, instrumentor: Option<Rc<PassInstrumentor<U>>>) -> Self {
        let mut maps = PrimaryMap::new();
        let id = maps.push(Slot {
            generation: 0,
            map: Some(NestedAnalysisMap::new(unit, MapLink::Root(instrumentor))),
        });
        Self {
            maps: RefCell::new(maps),
            free: Default::default(),
            root: NestedMapKey { id, generation: 0 },
        }
    }

    #[inline(always)]
    pub fn root(&self) -> NestedMapKey {
        self.root
    }

    /// Returns true if `key` refers to a map which has not been released
    pub fn is_live(&self, key: NestedMapKey) -> bool {
        self.maps
            .borrow()
            .get(key.id)
            .is_some_and(|slot| slot.generation == key.generation && slot.map.is_some())
    }

    /// Returns the number of maps currently allocated in this tree, including the root
    pub fn len(&self) -> usize {
        self.maps.borrow().values().filter(|slot| slot.map.is_some()).count()
    }

    /// Returns the IR unit that the map for `key` represents
    #[track_caller]
    pub fn unit(&self, key: NestedMapKey) -> U {
        self.with_map(key, |map| map.analyses.unit().clone())
    }

    /// Returns the parent map of `key`, or `None` if `key` is the root.
    #[track_caller]
    pub fn parent(&self, key: NestedMapKey) -> Option<NestedMapKey> {
        self.with_map(key, |map| match map.link {
            MapLink::Root(_) => None,
            MapLink::Child(parent) => Some(parent),
        })
    }

    /// Returns the [PassInstrumentor] for the tree, if one was installed.
    #[track_caller]
    pub fn pass_instrumentor(&self, key: NestedMapKey) -> Option<Rc<PassInstrumentor<U>>> {
        let maps = self.maps.borrow();
        let mut current = key;
        loop {
            match &lookup(&maps, current).link {
                MapLink::Root(instrumentor) => break instrumentor.clone(),
                MapLink::Child(parent) => current = *parent,
            }
        }
    }

    /// Get the map for the immediate child `unit` of `key`, if one was ever created.
    #[track_caller]
    pub fn child(&self, key: NestedMapKey, unit: &U) -> Option<NestedMapKey> {
        self.with_map(key, |map| map.children.get(unit).copied())
    }

    /// Returns the number of child maps of `key`
    #[track_caller]
    pub fn num_children(&self, key: NestedMapKey) -> usize {
        self.with_map(key, |map| map.children.len())
    }

    /// Get the map for the immediate child `unit` of `key`, creating it if necessary.
    ///
    /// Repeated requests for the same child always return the same map.
    #[track_caller]
    pub fn nest_immediate(&self, key: NestedMapKey, unit: U) -> NestedMapKey {
        if let Some(child) = self.child(key, &unit) {
            return child;
        }

        log::trace!(target: "analysis-manager", "creating nested analysis map for {unit:?}");
        let map = NestedAnalysisMap::new(unit.clone(), MapLink::Child(key));
        let child = self.alloc(map);
        self.with_map_mut(key, |map| map.children.insert(unit, child));
        child
    }

    /// Get a cached analysis of type `A` for `key`, if one exists.
    #[track_caller]
    pub fn get_cached<A>(&self, key: NestedMapKey) -> Option<Rc<A>>
    where
        A: Analysis,
    {
        self.with_map(key, |map| map.analyses.get_cached::<A>())
    }

    /// Returns true if an analysis with the given id is cached for `key`
    #[track_caller]
    pub fn is_cached(&self, key: NestedMapKey, id: &TypeId) -> bool {
        self.with_map(key, |map| map.analyses.contains(id))
    }

    /// Returns the number of analyses cached for `key`
    #[track_caller]
    pub fn num_cached(&self, key: NestedMapKey) -> usize {
        self.with_map(key, |map| map.analyses.len())
    }

    /// Get the analysis `A` for `key`, computing it if necessary.
    ///
    /// NOTE: This will panic if the unit of `key` is not an `A::Target`.
    #[track_caller]
    pub fn get_or_compute<A>(&self, key: NestedMapKey) -> Rc<A>
    where
        A: Analysis<Unit = U>,
    {
        let unit = self.unit(key);
        let target = into_target::<U, <A as Analysis>::Target>(&unit);
        self.get_or_compute_for::<A>(key, unit, target)
    }

    /// Same as [Self::get_or_compute], but returns an error if the unit of `key` is not an
    /// `A::Target`.
    #[track_caller]
    pub fn try_get_or_compute<A>(&self, key: NestedMapKey) -> Result<Rc<A>, AnalysisError>
    where
        A: Analysis<Unit = U>,
    {
        use alloc::format;

        let unit = self.unit(key);
        let target = <<A as Analysis>::Target as AnalysisTarget<U>>::try_from_unit(&unit)
            .ok_or_else(|| AnalysisError::InvalidTarget {
                unit: format!("{unit:?}"),
                expected: <<A as Analysis>::Target as AnalysisTarget<U>>::target_name(),
            })?;
        Ok(self.get_or_compute_for::<A>(key, unit, target))
    }

    fn get_or_compute_for<A>(
        &self,
        key: NestedMapKey,
        unit: U,
        target: <A as Analysis>::Target,
    ) -> Rc<A>
    where
        A: Analysis<Unit = U>,
    {
        if let Some(analysis) = self.get_cached::<A>(key) {
            log::trace!(
                target: "analysis-manager",
                "using cached '{}' for {unit:?}",
                <A as Analysis>::name()
            );
            return analysis;
        }

        // We don't have a cached analysis for the unit, compute it directly and add it to the
        // cache. The instrumentor is only notified of actual computations.
        let id = TypeId::of::<A>();
        let name = <A as Analysis>::name();
        let pi = self.pass_instrumentor(key);
        log::trace!(target: "analysis-manager", "computing '{name}' for {unit:?}");
        if let Some(pi) = pi.as_deref() {
            pi.run_before_analysis(name, &id, &unit);
        }

        let mut analysis = A::default();
        analysis.analyze(&target, AnalysisManager::new(self, key));
        let analysis = Rc::new(analysis);
        let cached = self.try_with_map_mut(key, |map| map.analyses.insert(Rc::clone(&analysis)));
        let analysis = match cached {
            Some(analysis) => analysis,
            None => {
                log::warn!(
                    target: "analysis-manager",
                    "the analyses for {unit:?} were cleared while computing '{name}', the result \
                     will not be cached"
                );
                analysis
            }
        };

        if let Some(pi) = pi.as_deref() {
            pi.run_after_analysis(name, &id, &unit);
        }

        analysis
    }

    /// Invalidate any non-preserved analyses of `key`, returning the number of evicted analyses.
    ///
    /// This only affects the analyses of `key` itself, not those of its children.
    #[track_caller]
    pub fn invalidate(&self, key: NestedMapKey, preserved_analyses: &PreservedAnalyses) -> usize {
        // Evicted analyses are dropped only once the arena is no longer borrowed
        let evicted = self.with_map_mut(key, |map| map.analyses.invalidate(preserved_analyses));
        if !evicted.is_empty() {
            log::trace!(
                target: "analysis-manager",
                "invalidated {} analyses for {:?}",
                evicted.len(),
                self.unit(key)
            );
        }
        evicted.len()
    }

    /// Clear the analyses of `key`, and release the maps of all of its descendants.
    #[track_caller]
    pub fn clear(&self, key: NestedMapKey) {
        let mut released = Vec::<NestedAnalysisMap<U>>::new();
        let evicted = {
            let mut maps = self.maps.borrow_mut();
            let map = lookup_mut(&mut maps, key);
            let evicted = map.analyses.clear();
            let mut worklist =
                map.children.drain().map(|(_, child)| child).collect::<SmallVec<[_; 8]>>();

            let mut free = self.free.borrow_mut();
            while let Some(child) = worklist.pop() {
                let slot = &mut maps[child.id];
                if slot.generation != child.generation {
                    continue;
                }
                if let Some(mut map) = slot.map.take() {
                    slot.generation = slot.generation.wrapping_add(1);
                    free.push(child.id);
                    worklist.extend(map.children.drain().map(|(_, child)| child));
                    released.push(map);
                }
            }
            evicted
        };

        log::trace!(
            target: "analysis-manager",
            "cleared {} analyses and released {} nested analysis maps for {:?}",
            evicted.len(),
            released.len(),
            self.unit(key)
        );
        drop(evicted);
        drop(released);
    }

    fn alloc(&self, map: NestedAnalysisMap<U>) -> NestedMapKey {
        let mut maps = self.maps.borrow_mut();
        match self.free.borrow_mut().pop() {
            Some(id) => {
                let slot = &mut maps[id];
                debug_assert!(slot.map.is_none(), "expected free slot to be vacant");
                slot.map = Some(map);
                NestedMapKey {
                    id,
                    generation: slot.generation,
                }
            }
            None => {
                let id = maps.push(Slot {
                    generation: 0,
                    map: Some(map),
                });
                NestedMapKey { id, generation: 0 }
            }
        }
    }

    #[inline]
    #[track_caller]
    fn with_map<R>(&self, key: NestedMapKey, f: impl FnOnce(&NestedAnalysisMap<U>) -> R) -> R {
        let maps = self.maps.borrow();
        f(lookup(&maps, key))
    }

    #[inline]
    #[track_caller]
    fn with_map_mut<R>(
        &self,
        key: NestedMapKey,
        f: impl FnOnce(&mut NestedAnalysisMap<U>) -> R,
    ) -> R {
        let mut maps = self.maps.borrow_mut();
        f(lookup_mut(&mut maps, key))
    }

    fn try_with_map_mut<R>(
        &self,
        key: NestedMapKey,
        f: impl FnOnce(&mut NestedAnalysisMap<U>) -> R,
    ) -> Option<R> {
        let mut maps = self.maps.borrow_mut();
        match maps.get_mut(key.id) {
            Some(Slot {
                generation,
                map: Some(map),
            }) if *generation == key.generation => Some(f(map)),
            _ => None,
        }
    }
}

#[inline]
#[track_caller]
fn lookup<U: IrUnit>(
    maps: &PrimaryMap<NestedMapId, Slot<U>>,
    key: NestedMapKey,
) -> &NestedAnalysisMap<U> {
    match maps.get(key.id) {
        Some(Slot {
            generation,
            map: Some(map),
        }) if *generation == key.generation => map,
        _ => released(key),
    }
}

#[inline]
#[track_caller]
fn lookup_mut<U: IrUnit>(
    maps: &mut PrimaryMap<NestedMapId, Slot<U>>,
    key: NestedMapKey,
) -> &mut NestedAnalysisMap<U> {
    match maps.get_mut(key.id) {
        Some(Slot {
            generation,
            map: Some(map),
        }) if *generation == key.generation => map,
        _ => released(key),
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn released(key: NestedMapKey) -> ! {
    panic!(
        "invalid analysis manager: the analyses for {} (generation {}) were released by a call to \
         `clear` on an ancestor",
        key.id, key.generation
    )
}
