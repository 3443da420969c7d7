//! Schema catalog — the compiled, read-only description of a device's
//! remote configuration tree.
//!
//! ```text
//! SchemaCatalog
//!   ├─ settings: [Group]          (GroupType::Setting)
//!   └─ state:    [Group]          (GroupType::State)
//!
//! Group { id, instances, max_depth }
//!   ├─ elements:    [Element]     element id = position
//!   └─ collections: [Collection]  collection id = position
//!                     ├─ elements
//!                     └─ collections   (arbitrarily nested)
//! ```
//!
//! The engine only ever reads the catalog. It walks it by index from the
//! group root, never by recursion. Catalogs are usually built in code, but
//! every type is `serde`-deserializable so hosts can load one from JSON.

mod limits;

pub use limits::ValueLimit;
pub(crate) use limits::validate_set;

use serde::{Deserialize, Serialize};

use crate::rci::list::MAX_LIST_DEPTH;

/// Numeric id of a group within its group table.
pub type GroupId = u16;
/// Position of an element within its owning group or collection.
pub type ElementId = u16;
/// Position of a collection within its parent group or collection.
pub type CollectionId = u16;

// ───────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────

/// Which of the two group tables a group lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    #[default]
    Setting,
    State,
}

/// Table-qualified group identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    #[serde(default)]
    pub kind: GroupType,
    pub id: GroupId,
}

impl GroupKey {
    pub const fn setting(id: GroupId) -> Self {
        Self {
            kind: GroupType::Setting,
            id,
        }
    }

    pub const fn state(id: GroupId) -> Self {
        Self {
            kind: GroupType::State,
            id,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Elements
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    String,
    MultilineString,
    Password,
    Ipv4,
    Int32,
    Uint32,
    Hex32,
    Float,
    Enum,
    OnOff,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl Access {
    pub fn can_set(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    pub fn can_query(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }
}

/// A leaf setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementType,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub limit: Option<ValueLimit>,
}

impl Element {
    pub fn new(name: &str, kind: ElementType) -> Self {
        Self {
            name: name.into(),
            kind,
            access: Access::ReadWrite,
            limit: None,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_limit(mut self, limit: ValueLimit) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ───────────────────────────────────────────────────────────────
// Collections
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    FixedArray,
    FixedDictionary,
    VariableArray,
    VariableDictionary,
}

impl CollectionKind {
    /// Variable collections grow and shrink at runtime.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::VariableArray | Self::VariableDictionary)
    }

    pub fn is_dictionary(self) -> bool {
        matches!(self, Self::FixedDictionary | Self::VariableDictionary)
    }
}

/// A repeated group body nested inside a group or another collection.
///
/// `capacity` is the instance count of a fixed collection and the maximum
/// instance count of a variable one. `keys` is the static key store of a
/// dictionary; a fixed dictionary has exactly `capacity` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub kind: CollectionKind,
    pub capacity: u16,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

impl Collection {
    pub fn new(name: &str, kind: CollectionKind, capacity: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            capacity,
            keys: Vec::new(),
            elements: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| (*k).into()).collect();
        self
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections.push(collection);
        self
    }

    /// Deepest nesting below and including this collection.
    fn depth(&self) -> usize {
        nesting_depth(core::slice::from_ref(self))
    }
}

/// Deepest collection nesting under `collections`, walked with an explicit
/// work list.
fn nesting_depth(collections: &[Collection]) -> usize {
    let mut deepest = 0;
    let mut work: Vec<(&Collection, usize)> = collections.iter().map(|c| (c, 1)).collect();
    while let Some((c, level)) = work.pop() {
        deepest = deepest.max(level);
        work.extend(c.collections.iter().map(|n| (n, level + 1)));
    }
    deepest
}

// ───────────────────────────────────────────────────────────────
// Groups
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Number of repeated instances (wire indices are `1..=instances`).
    #[serde(default = "one")]
    pub instances: u16,
    /// Maximum list nesting allowed while this group is active. Left at 0
    /// in a loaded catalog it is derived from the collections by
    /// [`SchemaCatalog::fill_depths`].
    #[serde(default)]
    pub max_depth: usize,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

fn one() -> u16 {
    1
}

impl Group {
    pub fn new(id: GroupId, name: &str) -> Self {
        Self {
            id,
            name: name.into(),
            instances: 1,
            max_depth: 0,
            elements: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub fn with_instances(mut self, instances: u16) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    /// Add a nested collection; `max_depth` grows to cover it.
    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.max_depth = self.max_depth.max(collection.depth());
        self.collections.push(collection);
        self
    }

    /// Override the declared nesting depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Declared nesting depth, capped by the list stack capacity.
    pub fn depth_limit(&self) -> usize {
        self.max_depth.min(MAX_LIST_DEPTH)
    }

    pub fn has_index(&self, index: u16) -> bool {
        (1..=self.instances).contains(&index)
    }
}

// ───────────────────────────────────────────────────────────────
// Catalog
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub settings: Vec<Group>,
    #[serde(default)]
    pub state: Vec<Group>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, kind: GroupType, group: Group) -> Self {
        self.table_mut(kind).push(group);
        self
    }

    pub fn with_setting(self, group: Group) -> Self {
        self.with_group(GroupType::Setting, group)
    }

    pub fn with_state(self, group: Group) -> Self {
        self.with_group(GroupType::State, group)
    }

    pub fn group(&self, key: GroupKey) -> Option<&Group> {
        self.table(key.kind).iter().find(|g| g.id == key.id)
    }

    pub fn table(&self, kind: GroupType) -> &[Group] {
        match kind {
            GroupType::Setting => &self.settings,
            GroupType::State => &self.state,
        }
    }

    fn table_mut(&mut self, kind: GroupType) -> &mut Vec<Group> {
        match kind {
            GroupType::Setting => &mut self.settings,
            GroupType::State => &mut self.state,
        }
    }

    /// Give every group that declares no `max_depth` the depth of its
    /// collection nesting.
    pub fn fill_depths(&mut self) {
        for g in self.settings.iter_mut().chain(self.state.iter_mut()) {
            if g.max_depth == 0 {
                g.max_depth = nesting_depth(&g.collections);
            }
        }
    }

    /// Structural sanity checks run once when an engine is built.
    pub fn validate(&self) -> Result<(), &'static str> {
        for kind in [GroupType::Setting, GroupType::State] {
            let table = self.table(kind);
            for (i, g) in table.iter().enumerate() {
                if table[..i].iter().any(|other| other.id == g.id) {
                    return Err("duplicate group id");
                }
                if g.instances == 0 {
                    return Err("group must have at least one instance");
                }
                if g.max_depth > MAX_LIST_DEPTH {
                    return Err("group nesting exceeds list stack capacity");
                }
                if g.max_depth == 0 && !g.collections.is_empty() {
                    return Err("group with collections allows no list nesting");
                }
                validate_collections(&g.collections)?;
            }
        }
        Ok(())
    }
}

fn validate_collections(collections: &[Collection]) -> Result<(), &'static str> {
    let mut work: Vec<&Collection> = collections.iter().collect();
    while let Some(c) = work.pop() {
        match c.kind {
            CollectionKind::FixedDictionary if c.keys.len() != c.capacity as usize => {
                return Err("fixed dictionary key store must match its capacity");
            }
            CollectionKind::VariableDictionary if c.keys.len() > c.capacity as usize => {
                return Err("dictionary key store exceeds capacity");
            }
            CollectionKind::FixedArray | CollectionKind::VariableArray if !c.keys.is_empty() => {
                return Err("arrays have no key store");
            }
            _ => {}
        }
        work.extend(c.collections.iter());
    }
    Ok(())
}
