use crate::component::ComponentTypeRegistry;
use crate::Component;
use ecs_internal::idx_type;
use fixedbitset::FixedBitSet;
use fxhash::FxHashMap;
use std::sync::{Mutex, OnceLock};

idx_type!(pub FamilyIdx);

/// An immutable predicate over the set of component types present on an entity.
///
/// Two descriptors built from the same `all`/`one`/`exclude` component types are
/// structurally equal and canonicalize to the same [`Family`] value and the same
/// [`index`](Family::index), the same way the source engine's family registry is
/// global rather than owned by a single engine: two `Engine`s running in the same
/// process that register the same family agree on its index.
///
/// # Examples
///
/// ```
/// # use ecs::Family;
/// # struct Position;
/// # struct Velocity;
/// # struct Frozen;
/// let moving = Family::all::<Position>().all::<Velocity>().exclude::<Frozen>().get();
/// ```
#[derive(Clone, Debug)]
pub struct Family {
    all: FixedBitSet,
    one: FixedBitSet,
    exclude: FixedBitSet,
    index: FamilyIdx,
}

impl Family {
    /// Starts building a family that must contain a component of type `C`.
    #[must_use]
    pub fn all<C>() -> FamilyBuilder
    where
        C: Component,
    {
        FamilyBuilder::default().all::<C>()
    }

    /// Starts building a family that must contain at least one component among those
    /// added with further calls to [`FamilyBuilder::one`].
    #[must_use]
    pub fn one<C>() -> FamilyBuilder
    where
        C: Component,
    {
        FamilyBuilder::default().one::<C>()
    }

    /// Starts building a family that must not contain a component of type `C`.
    #[must_use]
    pub fn exclude<C>() -> FamilyBuilder
    where
        C: Component,
    {
        FamilyBuilder::default().exclude::<C>()
    }

    /// Returns the family matching every entity, regardless of its components.
    #[must_use]
    pub fn everything() -> Family {
        FamilyBuilder::default().get()
    }

    /// Returns the stable, process-wide index of this family.
    #[must_use]
    pub fn index(&self) -> FamilyIdx {
        self.index
    }

    pub(crate) fn matches(&self, component_bits: &FixedBitSet) -> bool {
        let has_all = self.all.ones().all(|i| component_bits.contains(i));
        let has_one = self.one.count_ones(..) == 0 || self.one.ones().any(|i| component_bits.contains(i));
        let has_none_excluded = self.exclude.ones().all(|i| !component_bits.contains(i));
        has_all && has_one && has_none_excluded
    }
}

/// Accumulates `all`/`one`/`exclude` component-type constraints for a [`Family`].
#[derive(Clone, Debug, Default)]
pub struct FamilyBuilder {
    all: FixedBitSet,
    one: FixedBitSet,
    exclude: FixedBitSet,
}

impl FamilyBuilder {
    /// Adds `C` to the set of components the family requires.
    #[must_use]
    pub fn all<C>(mut self) -> Self
    where
        C: Component,
    {
        insert(&mut self.all, ComponentTypeRegistry::type_idx_of::<C>().into());
        self
    }

    /// Adds `C` to the set of components of which the family requires at least one.
    #[must_use]
    pub fn one<C>(mut self) -> Self
    where
        C: Component,
    {
        insert(&mut self.one, ComponentTypeRegistry::type_idx_of::<C>().into());
        self
    }

    /// Adds `C` to the set of components the family forbids.
    #[must_use]
    pub fn exclude<C>(mut self) -> Self
    where
        C: Component,
    {
        insert(&mut self.exclude, ComponentTypeRegistry::type_idx_of::<C>().into());
        self
    }

    /// Returns the canonical [`Family`] for the accumulated constraints.
    ///
    /// Two builders accumulating structurally equal constraints return the same
    /// instance and the same index.
    #[must_use]
    pub fn get(self) -> Family {
        FamilyRegistry::canonicalize(self.all, self.one, self.exclude)
    }
}

fn insert(bits: &mut FixedBitSet, index: usize) {
    if index >= bits.len() {
        bits.grow(index + 1);
    }
    bits.insert(index);
}

/// Hashable, order-independent snapshot of a family descriptor, used only as a
/// canonicalization key: [`FixedBitSet`] does not itself implement `Hash`.
type FamilyKey = (Vec<u32>, Vec<u32>, Vec<u32>);

fn key_of(bits: &FixedBitSet) -> Vec<u32> {
    bits.ones().map(|i| i as u32).collect()
}

struct FamilyRegistry;

impl FamilyRegistry {
    fn canonicalize(all: FixedBitSet, one: FixedBitSet, exclude: FixedBitSet) -> Family {
        let key: FamilyKey = (key_of(&all), key_of(&one), key_of(&exclude));
        let registry = Self::families();
        let mut registry = registry.lock().expect("family registry poisoned");
        if let Some(index) = registry.get(&key) {
            return Family {
                all,
                one,
                exclude,
                index: *index,
            };
        }
        let index = FamilyIdx::from(registry.len());
        registry.insert(key, index);
        Family {
            all,
            one,
            exclude,
            index,
        }
    }

    fn families() -> &'static Mutex<FxHashMap<FamilyKey, FamilyIdx>> {
        static FAMILIES: OnceLock<Mutex<FxHashMap<FamilyKey, FamilyIdx>>> = OnceLock::new();
        FAMILIES.get_or_init(|| Mutex::new(FxHashMap::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;

    #[test]
    fn get_is_idempotent_for_structurally_equal_descriptors() {
        let first = Family::all::<A>().exclude::<B>().get();
        let second = Family::all::<A>().exclude::<B>().get();
        assert_eq!(first.index(), second.index());
    }

    #[test]
    fn distinct_descriptors_get_distinct_indexes() {
        let all_a = Family::all::<A>().get();
        let all_b = Family::all::<B>().get();
        assert_ne!(all_a.index(), all_b.index());
    }

    #[test]
    fn empty_family_matches_everything() {
        let everything = Family::everything();
        assert!(everything.matches(&FixedBitSet::with_capacity(0)));
        let mut bits = FixedBitSet::with_capacity(4);
        bits.insert(2);
        assert!(everything.matches(&bits));
    }

    #[test]
    fn matches_combines_all_one_and_exclude() {
        let a = ComponentTypeRegistry::type_idx_of::<A>();
        let b = ComponentTypeRegistry::type_idx_of::<B>();
        let c = ComponentTypeRegistry::type_idx_of::<C>();
        let family = Family::all::<A>().one::<B>().exclude::<C>().get();
        let mut matching = FixedBitSet::with_capacity(usize::from(c) + 1);
        matching.insert(a.into());
        matching.insert(b.into());
        assert!(family.matches(&matching));
        matching.insert(c.into());
        assert!(!family.matches(&matching));
    }
}
