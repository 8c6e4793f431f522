//! Static routing table for one board

use super::Destination;
use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};

/// Where this board sits in the tree
///
/// Board ids increase with distance from the root: the parent has a lower
/// id, everything on the sub-buses a higher one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardAddress {
    /// This board
    pub local_id: u8,
    /// Upstream board, absent on the network root
    pub parent_id: Option<u8>,
    /// Boards reachable through downstream bus #1
    pub sub_bus_1: Vec<u8>,
    /// Boards reachable through downstream bus #2
    pub sub_bus_2: Vec<u8>,
}

impl Default for BoardAddress {
    fn default() -> Self {
        Self {
            local_id: 1,
            parent_id: None,
            sub_bus_1: Vec::new(),
            sub_bus_2: Vec::new(),
        }
    }
}

impl BoardAddress {
    pub fn new(local_id: u8) -> Self {
        Self {
            local_id,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: u8) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_sub_bus_1(mut self, ids: impl IntoIterator<Item = u8>) -> Self {
        self.sub_bus_1 = ids.into_iter().collect();
        self
    }

    pub fn with_sub_bus_2(mut self, ids: impl IntoIterator<Item = u8>) -> Self {
        self.sub_bus_2 = ids.into_iter().collect();
        self
    }

    /// Resolve a recipient id. First match wins: local, parent, bus #1, bus #2.
    pub fn classify(&self, rid: u8) -> Destination {
        if rid == self.local_id {
            Destination::Local
        } else if self.parent_id == Some(rid) {
            Destination::Parent
        } else if self.sub_bus_1.contains(&rid) {
            Destination::SubBus1
        } else if self.sub_bus_2.contains(&rid) {
            Destination::SubBus2
        } else {
            Destination::Unknown
        }
    }

    /// Ids listed on both sub-buses (bus #1 wins for those)
    pub fn overlapping_ids(&self) -> Vec<u8> {
        self.sub_bus_1
            .iter()
            .copied()
            .filter(|id| self.sub_bus_2.contains(id))
            .collect()
    }

    /// Check the id ordering invariant
    ///
    /// # Errors
    ///
    /// `ConfigValidation` when the parent id is not below the local id, or a
    /// sub-bus id is not above it.
    pub fn validate(&self) -> Result<()> {
        if let Some(parent) = self.parent_id {
            if parent >= self.local_id {
                return Err(NodeError::ConfigValidation {
                    field: "board.parent_id",
                    reason: format!(
                        "parent id {} must be lower than local id {}",
                        parent, self.local_id
                    ),
                });
            }
        }

        let below = [("board.sub_bus_1", &self.sub_bus_1), ("board.sub_bus_2", &self.sub_bus_2)];
        for (field, ids) in below {
            if let Some(id) = ids.iter().find(|&&id| id <= self.local_id) {
                return Err(NodeError::ConfigValidation {
                    field,
                    reason: format!(
                        "sub-bus id {} must be higher than local id {}",
                        id, self.local_id
                    ),
                });
            }
        }
        Ok(())
    }
}
