//! Personal knowledge document
//!
//! A flat JSON document of named groups, each holding notes. Every item lives
//! in exactly one group; the `ungrouped` group always exists and cannot be
//! removed.

use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

pub const UNGROUPED: &str = "ungrouped";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: u64,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGroup {
    pub name: String,
    #[serde(default)]
    pub items: Vec<KnowledgeItem>,
}

impl KnowledgeGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub groups: Vec<KnowledgeGroup>,
}

/// Older documents were a bare list of items with no grouping.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Grouped(KnowledgeBase),
    Legacy(Vec<KnowledgeItem>),
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            groups: vec![KnowledgeGroup::new(UNGROUPED)],
        }
    }
}

impl KnowledgeBase {
    pub fn from_json(bytes: &[u8]) -> Result<Self, KnowledgeError> {
        let base = match serde_json::from_slice::<StoredDocument>(bytes)? {
            StoredDocument::Grouped(base) => base,
            StoredDocument::Legacy(items) => Self {
                groups: vec![KnowledgeGroup {
                    name: UNGROUPED.to_string(),
                    items,
                }],
            },
        };
        Ok(base)
    }

    pub fn to_json_pretty(&self) -> Result<String, KnowledgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn group(&self, name: &str) -> Option<&KnowledgeGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Returns the group name and the item with `id`, if present.
    pub fn find_item(&self, id: u64) -> Option<(&str, &KnowledgeItem)> {
        self.groups.iter().find_map(|group| {
            group
                .items
                .iter()
                .find(|item| item.id == id)
                .map(|item| (group.name.as_str(), item))
        })
    }

    /// One past the largest id across all groups.
    pub fn next_id(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter())
            .map(|item| item.id)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Appends a note to `ungrouped` and returns its id.
    pub fn add_item(&mut self, content: impl Into<String>, timestamp: impl Into<String>) -> u64 {
        let id = self.next_id();
        self.ungrouped_mut().items.push(KnowledgeItem {
            id,
            content: content.into(),
            timestamp: timestamp.into(),
        });
        id
    }

    pub fn delete_item(&mut self, id: u64) -> Result<KnowledgeItem, KnowledgeError> {
        for group in &mut self.groups {
            if let Some(pos) = group.items.iter().position(|item| item.id == id) {
                return Ok(group.items.remove(pos));
            }
        }
        Err(KnowledgeError::ItemNotFound(id))
    }

    pub fn create_group(&mut self, name: &str) -> Result<(), KnowledgeError> {
        if name.trim().is_empty() {
            return Err(KnowledgeError::InvalidGroupName);
        }
        if self.group(name).is_some() {
            return Err(KnowledgeError::GroupExists(name.to_string()));
        }
        self.groups.push(KnowledgeGroup::new(name));
        Ok(())
    }

    /// Removes a group, moving its items into `ungrouped`. Returns how many
    /// items were moved.
    pub fn delete_group(&mut self, name: &str) -> Result<usize, KnowledgeError> {
        if name == UNGROUPED {
            return Err(KnowledgeError::ProtectedGroup(name.to_string()));
        }
        let pos = self
            .groups
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| KnowledgeError::GroupNotFound(name.to_string()))?;
        let removed = self.groups.remove(pos);
        let moved = removed.items.len();
        self.ungrouped_mut().items.extend(removed.items);
        Ok(moved)
    }

    /// Moves an item to `target`. Both must exist before anything changes.
    pub fn move_item(&mut self, id: u64, target: &str) -> Result<(), KnowledgeError> {
        if self.find_item(id).is_none() {
            return Err(KnowledgeError::ItemNotFound(id));
        }
        if self.group(target).is_none() {
            return Err(KnowledgeError::GroupNotFound(target.to_string()));
        }
        let item = self.delete_item(id)?;
        if let Some(group) = self.groups.iter_mut().find(|g| g.name == target) {
            group.items.push(item);
        }
        Ok(())
    }

    fn ungrouped_mut(&mut self) -> &mut KnowledgeGroup {
        let pos = match self.groups.iter().position(|g| g.name == UNGROUPED) {
            Some(pos) => pos,
            None => {
                self.groups.insert(0, KnowledgeGroup::new(UNGROUPED));
                0
            }
        };
        &mut self.groups[pos]
    }
}
