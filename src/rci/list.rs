//! List stack and collection resolver.
//!
//! Nested collections are tracked as an explicit bounded stack of
//! [`ListLevel`] records. Every query about the level in effect re-walks the
//! schema from the group root through each level by index; nothing about the
//! schema is cached on the stack.
//!
//! ```text
//!   Group ──collections[l0.collection]──▶ Collection
//!              ──collections[l1.collection]──▶ Collection
//!                 ──collections[l2.collection]──▶ ...  (≤ MAX_LIST_DEPTH)
//! ```

use crate::error::{Error, InvariantViolation, RequestError, Result};
use crate::rci::lock::LockToken;
use crate::rci::request::{KeyName, truncated};
use crate::schema::{Collection, CollectionId, CollectionKind, Element, Group};

/// Hard cap on nesting, independent of any schema.
pub const MAX_LIST_DEPTH: usize = 8;

/// `(collection id, resolved instance)` for every level, root first.
pub type LevelPath = heapless::Vec<(CollectionId, u16), MAX_LIST_DEPTH>;

/// One open collection level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLevel {
    pub collection: CollectionId,
    /// `None` until `resolve_instance` succeeds.
    pub instance: Option<u16>,
    pub lock: Option<LockToken>,
    /// Instance count: capacity for fixed collections, reported size for
    /// variable ones.
    pub count: u16,
    /// Key registered for a dictionary entry beyond the static key store.
    pub dynamic_key: Option<KeyName>,
}

#[derive(Debug, Default)]
pub struct ListStack {
    levels: heapless::Vec<ListLevel, MAX_LIST_DEPTH>,
}

impl ListStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn top(&self) -> Option<&ListLevel> {
        self.levels.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ListLevel> {
        self.levels.last_mut()
    }

    pub fn levels(&self) -> impl Iterator<Item = &ListLevel> {
        self.levels.iter()
    }

    /// Open a level for `collection` below the current one.
    pub fn push(&mut self, group: &Group, collection: CollectionId) -> Result<()> {
        let max = group.depth_limit();
        if self.levels.len() >= max {
            return Err(InvariantViolation::DepthExceeded { max }.into());
        }
        if let Some(top) = self.levels.last() {
            if top.instance.is_none() {
                return Err(InvariantViolation::UnresolvedInstance {
                    collection: top.collection,
                }
                .into());
            }
        }

        let siblings = match self.current_collection(group) {
            Some(parent) => &parent.collections,
            None => &group.collections,
        };
        let desc = siblings
            .get(collection as usize)
            .ok_or(RequestError::UnknownCollection)?;

        let count = if desc.kind.is_dynamic() { 0 } else { desc.capacity };
        self.levels
            .push(ListLevel {
                collection,
                instance: None,
                lock: None,
                count,
                dynamic_key: None,
            })
            .map_err(|_| InvariantViolation::DepthExceeded { max })?;
        Ok(())
    }

    /// Validate and store the instance index of the top level.
    ///
    /// For variable collections `index == count` appends a new instance,
    /// allowed only while `count < capacity`. Returns `true` on append.
    pub fn resolve_instance(&mut self, group: &Group, index: u16) -> Result<bool> {
        let capacity = self
            .current_collection(group)
            .map(|c| c.capacity)
            .ok_or(InvariantViolation::NoActiveLevel)?;
        let dynamic = self.is_dynamic(group);
        let level = self
            .levels
            .last_mut()
            .ok_or(InvariantViolation::NoActiveLevel)?;

        let append = if index < level.count {
            false
        } else if dynamic && index == level.count && level.count < capacity {
            true
        } else {
            return Err(RequestError::InvalidIndex.into());
        };

        if append {
            level.count += 1;
        }
        level.instance = Some(index);
        Ok(append)
    }

    /// Locate a dictionary entry by name.
    ///
    /// Returns the static key-store index and `true`, or for a variable
    /// dictionary the append index and `false` when the key is not in the
    /// static store.
    pub fn index_of_key(&self, group: &Group, key: &str) -> Result<(u16, bool)> {
        let desc = self
            .current_collection(group)
            .ok_or(InvariantViolation::NoActiveLevel)?;
        let level = self.levels.last().ok_or(InvariantViolation::NoActiveLevel)?;
        if !desc.kind.is_dictionary() {
            return Err(RequestError::InvalidIndex.into());
        }
        if let Some(pos) = desc.keys.iter().position(|k| k == key) {
            return Ok((pos as u16, true));
        }
        if desc.kind.is_dynamic() {
            Ok((level.count, false))
        } else {
            Err(RequestError::InvalidIndex.into())
        }
    }

    /// Remove the top level. Any lock it holds must be released by the caller.
    pub fn pop(&mut self) -> Option<ListLevel> {
        self.levels.pop()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Record the instance count a variable collection's owner reported.
    pub fn set_count(&mut self, group: &Group, count: u16) -> Result<()> {
        let capacity = self
            .current_collection(group)
            .map(|c| c.capacity)
            .ok_or(InvariantViolation::NoActiveLevel)?;
        let level = self
            .levels
            .last_mut()
            .ok_or(InvariantViolation::NoActiveLevel)?;
        level.count = count.min(capacity);
        Ok(())
    }

    /// Attach a runtime key to the top level of a dictionary.
    pub fn register_key(&mut self, key: &str) -> Result<()> {
        let level = self
            .levels
            .last_mut()
            .ok_or(InvariantViolation::NoActiveLevel)?;
        level.dynamic_key = Some(truncated(key));
        Ok(())
    }

    /// Instance count of the top level. The instance must be resolved.
    pub fn current_count(&self) -> Result<u16> {
        let level = self.resolved_top()?;
        Ok(level.count)
    }

    /// Key name of the resolved top-level instance, `None` for arrays.
    pub fn current_key_name<'a>(&'a self, group: &'a Group) -> Result<Option<&'a str>> {
        let level = self.resolved_top()?;
        let desc = self
            .current_collection(group)
            .ok_or(InvariantViolation::NoActiveLevel)?;
        if !desc.kind.is_dictionary() {
            return Ok(None);
        }
        let index = level.instance.unwrap_or_default() as usize;
        Ok(desc
            .keys
            .get(index)
            .map(String::as_str)
            .or(level.dynamic_key.as_deref()))
    }

    /// Collection descriptor for the top level, found by walking from the
    /// group root.
    pub fn current_collection<'g>(&self, group: &'g Group) -> Option<&'g Collection> {
        let mut levels = self.levels.iter();
        let first = levels.next()?;
        let mut desc = group.collections.get(first.collection as usize)?;
        for level in levels {
            desc = desc.collections.get(level.collection as usize)?;
        }
        Some(desc)
    }

    pub fn collection_kind(&self, group: &Group) -> Option<CollectionKind> {
        self.current_collection(group).map(|c| c.kind)
    }

    pub fn is_dynamic(&self, group: &Group) -> bool {
        self.collection_kind(group)
            .is_some_and(CollectionKind::is_dynamic)
    }

    /// Element table in effect: the top collection's, or the group's own.
    pub fn elements<'g>(&self, group: &'g Group) -> Result<&'g [Element]> {
        if self.levels.is_empty() {
            return Ok(&group.elements);
        }
        self.resolved_top()?;
        self.current_collection(group)
            .map(|c| c.elements.as_slice())
            .ok_or_else(|| InvariantViolation::NoActiveLevel.into())
    }

    /// Path of resolved instances from the root, used as the lock key.
    pub fn lock_path(&self) -> Result<LevelPath> {
        let mut path = LevelPath::new();
        for level in &self.levels {
            let instance = level.instance.ok_or(InvariantViolation::UnresolvedInstance {
                collection: level.collection,
            })?;
            // Capacity equals the stack's; cannot overflow.
            let _ = path.push((level.collection, instance));
        }
        Ok(path)
    }

    fn resolved_top(&self) -> Result<&ListLevel> {
        let level = self.levels.last().ok_or(InvariantViolation::NoActiveLevel)?;
        if level.instance.is_none() {
            return Err(Error::Invariant(InvariantViolation::UnresolvedInstance {
                collection: level.collection,
            }));
        }
        Ok(level)
    }
}
