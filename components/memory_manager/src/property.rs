//! Named properties of an object.
//!
//! Properties are appended to a list of two-entry pairs in insertion order,
//! which is also the enumeration order. Small tables are searched linearly;
//! once a table holds enough properties a [`PropertyHashmap`] is built on the
//! heap to index it. A hash map that cannot be allocated is simply skipped.

use std::fmt;
use std::rc::Rc;

use core_types::Value;

use crate::heap::JmemHeap;
use crate::property_hashmap::{
    DeleteStatus, InsertStatus, PairSlot, PropertyHashmap, MINIMUM_SIZE,
};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 16-bit FNV-1a hash of a property name.
pub fn name_hash(name: &str) -> u16 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as u16
}

/// Interned-style property key with its hash precomputed.
#[derive(Clone)]
pub struct PropertyName {
    text: Rc<str>,
    hash: u16,
}

impl PropertyName {
    /// Creates a key.
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        let text = text.into();
        let hash = name_hash(&text);
        PropertyName { text, hash }
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Precomputed hash.
    pub fn hash(&self) -> u16 {
        self.hash
    }
}

impl PartialEq for PropertyName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}

impl Eq for PropertyName {}

impl fmt::Debug for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.text)
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for PropertyName {
    fn from(text: &str) -> Self {
        PropertyName::new(text)
    }
}

impl From<String> for PropertyName {
    fn from(text: String) -> Self {
        PropertyName::new(text)
    }
}

/// Property attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    /// Value may be reassigned
    pub const WRITABLE: PropertyFlags = PropertyFlags(1);
    /// Visible to `for-in`
    pub const ENUMERABLE: PropertyFlags = PropertyFlags(2);
    /// May be deleted
    pub const CONFIGURABLE: PropertyFlags = PropertyFlags(4);
    /// Attributes of a property created by assignment
    pub const DEFAULT: PropertyFlags = PropertyFlags(7);
    /// Attributes of built-in methods and internal slots
    pub const HIDDEN: PropertyFlags = PropertyFlags(5);

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for PropertyFlags {
    type Output = PropertyFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        PropertyFlags(self.0 | rhs.0)
    }
}

/// A stored property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Property {
    /// Plain value
    Data {
        /// Stored value
        value: Value,
        /// Attributes
        flags: PropertyFlags,
    },
    /// Getter/setter pair; a missing half is `undefined`
    Accessor {
        /// Getter function object
        getter: Value,
        /// Setter function object
        setter: Value,
        /// Attributes
        flags: PropertyFlags,
    },
}

impl Property {
    /// Data property with default attributes.
    pub fn data(value: Value) -> Self {
        Property::Data {
            value,
            flags: PropertyFlags::DEFAULT,
        }
    }

    /// Attributes of the property.
    pub fn flags(&self) -> PropertyFlags {
        match self {
            Property::Data { flags, .. } | Property::Accessor { flags, .. } => *flags,
        }
    }

    /// Whether `for-in` lists the property.
    pub fn is_enumerable(&self) -> bool {
        self.flags().contains(PropertyFlags::ENUMERABLE)
    }
}

type Entry = (PropertyName, Property);

#[derive(Debug, Default)]
struct PropertyPair {
    entries: [Option<Entry>; 2],
}

/// Insertion-ordered property storage with an optional hash index.
///
/// # Examples
///
/// ```
/// use core_types::Value;
/// use memory_manager::{JmemHeap, Property, PropertyTable};
///
/// let mut heap = JmemHeap::new(64 * 1024);
/// let mut table = PropertyTable::new();
/// table.insert(&mut heap, "x".into(), Property::data(Value::make_integer(1)));
/// assert!(table.get(&heap, "x").is_some());
/// table.remove(&mut heap, "x");
/// assert!(table.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct PropertyTable {
    pairs: Vec<PropertyPair>,
    /// Entries ever appended since the last compaction.
    appended: u32,
    live: u32,
    hashmap: Option<PropertyHashmap>,
}

impl PropertyTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live properties.
    pub fn len(&self) -> usize {
        self.live as usize
    }

    /// Whether the table holds no properties.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether lookups go through a hash map.
    pub fn has_hashmap(&self) -> bool {
        self.hashmap.is_some()
    }

    /// The hash map, if one is built.
    pub fn hashmap(&self) -> Option<&PropertyHashmap> {
        self.hashmap.as_ref()
    }

    /// Looks up a property.
    pub fn get(&self, heap: &JmemHeap, name: &str) -> Option<&Property> {
        let slot = self.locate(heap, name)?;
        self.entry(slot).map(|(_, property)| property)
    }

    /// Looks up a property for modification.
    pub fn get_mut(&mut self, heap: &JmemHeap, name: &str) -> Option<&mut Property> {
        let slot = self.locate(heap, name)?;
        self.entry_mut(slot).map(|(_, property)| property)
    }

    /// Whether the property exists.
    pub fn contains(&self, heap: &JmemHeap, name: &str) -> bool {
        self.locate(heap, name).is_some()
    }

    /// Adds or replaces a property, returning the previous one.
    pub fn insert(
        &mut self,
        heap: &mut JmemHeap,
        name: PropertyName,
        property: Property,
    ) -> Option<Property> {
        if let Some(slot) = self.locate(heap, name.as_str()) {
            return self
                .entry_mut(slot)
                .map(|(_, existing)| std::mem::replace(existing, property));
        }

        let hash = name.hash();
        let slot = self.append((name, property));
        self.live += 1;
        let rebuild = match self.hashmap.as_mut() {
            Some(map) => map.insert(heap, hash, slot) == InsertStatus::Recreate,
            None => self.live >= MINIMUM_SIZE / 2,
        };
        if rebuild {
            self.rebuild_hashmap(heap);
        }
        None
    }

    /// Deletes a property, returning it.
    pub fn remove(&mut self, heap: &mut JmemHeap, name: &str) -> Option<Property> {
        let slot = self.locate(heap, name)?;
        let pair = self.pairs.get_mut(slot.pair as usize - 1)?;
        let (removed_name, property) = pair.entries[slot.half as usize].take()?;
        self.live -= 1;

        let rebuild = match self.hashmap.as_mut() {
            Some(map) => map.delete(heap, removed_name.hash(), slot) == DeleteStatus::Recreate,
            None => false,
        };
        if rebuild {
            self.rebuild_hashmap(heap);
        } else if self.hashmap.is_none() && self.appended - self.live > self.live.max(4) {
            self.compact();
        }
        Some(property)
    }

    /// Live properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyName, &Property)> + '_ {
        self.pairs
            .iter()
            .flat_map(|pair| pair.entries.iter())
            .filter_map(|entry| entry.as_ref().map(|(name, property)| (name, property)))
    }

    /// Names in insertion order.
    pub fn keys(&self) -> Vec<PropertyName> {
        self.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Frees the hash map block and drops every property.
    pub fn release(&mut self, heap: &mut JmemHeap) {
        if let Some(map) = self.hashmap.take() {
            map.free(heap);
        }
        self.pairs.clear();
        self.appended = 0;
        self.live = 0;
    }

    fn locate(&self, heap: &JmemHeap, name: &str) -> Option<PairSlot> {
        match &self.hashmap {
            Some(map) => map.find(heap, name_hash(name), |slot| {
                self.entry(slot)
                    .map_or(false, |(candidate, _)| candidate.as_str() == name)
            }),
            None => self.pairs.iter().enumerate().find_map(|(index, pair)| {
                pair.entries.iter().enumerate().find_map(|(half, entry)| match entry {
                    Some((candidate, _)) if candidate.as_str() == name => Some(PairSlot {
                        pair: index as u32 + 1,
                        half: half as u8,
                    }),
                    _ => None,
                })
            }),
        }
    }

    fn entry(&self, slot: PairSlot) -> Option<&Entry> {
        let pair = self.pairs.get((slot.pair as usize).checked_sub(1)?)?;
        pair.entries.get(slot.half as usize)?.as_ref()
    }

    fn entry_mut(&mut self, slot: PairSlot) -> Option<&mut Entry> {
        let pair = self.pairs.get_mut((slot.pair as usize).checked_sub(1)?)?;
        pair.entries.get_mut(slot.half as usize)?.as_mut()
    }

    fn append(&mut self, entry: Entry) -> PairSlot {
        let half = (self.appended % 2) as usize;
        if half == 0 {
            self.pairs.push(PropertyPair::default());
        }
        let index = self.pairs.len() - 1;
        self.pairs[index].entries[half] = Some(entry);
        self.appended += 1;
        PairSlot {
            pair: index as u32 + 1,
            half: half as u8,
        }
    }

    fn compact(&mut self) {
        let entries: Vec<Entry> = self
            .pairs
            .drain(..)
            .flat_map(|pair| pair.entries.into_iter().flatten())
            .collect();
        self.appended = 0;
        for entry in entries {
            self.append(entry);
        }
    }

    fn rebuild_hashmap(&mut self, heap: &mut JmemHeap) {
        if let Some(map) = self.hashmap.take() {
            map.free(heap);
        }
        if self.appended != self.live {
            self.compact();
        }
        let entries: Vec<(u16, PairSlot)> = self
            .pairs
            .iter()
            .enumerate()
            .flat_map(|(index, pair)| {
                pair.entries.iter().enumerate().filter_map(move |(half, entry)| {
                    entry.as_ref().map(|(name, _)| {
                        (
                            name.hash(),
                            PairSlot {
                                pair: index as u32 + 1,
                                half: half as u8,
                            },
                        )
                    })
                })
            })
            .collect();
        self.hashmap = PropertyHashmap::create(heap, self.live, entries);
    }
}
