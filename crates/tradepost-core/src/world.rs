//! Towns and their positions.
//!
//! [`World`] is the distance oracle for courier pricing: the distance
//! between two towns is the straight line between their positions. Unknown
//! towns are infinitely far away, which prices any courier job between them
//! out of every budget.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use tradepost_ledger::{ResourceLedger, TownLedger};
use tradepost_market::DistanceOracle;
use tradepost_types::AgentId;

use crate::config::{Position, TownConfig};

/// Errors that can occur when building the world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A town with this name already exists.
    #[error("duplicate town name: {0}")]
    DuplicateName(String),

    /// A town with this id already exists.
    #[error("duplicate town id: {0}")]
    DuplicateId(AgentId),
}

/// A town: one autonomous trading agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Town {
    /// Agent id of the town.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Location on the world map.
    pub position: Position,
}

/// Every town in the world, in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    towns: BTreeMap<AgentId, Town>,
}

impl World {
    /// Create an empty world.
    pub const fn new() -> Self {
        Self {
            towns: BTreeMap::new(),
        }
    }

    /// Create the configured towns and credit their starting stock.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateName`] if two towns share a name.
    pub fn seed(towns: &[TownConfig], ledger: &mut TownLedger) -> Result<Self, WorldError> {
        let mut world = Self::new();
        for config in towns {
            let id = world.insert(Town {
                id: AgentId::new(),
                name: config.name.clone(),
                position: config.position,
            })?;
            ledger.open_account(id);
            for (resource, quantity) in &config.stock {
                ledger.credit(id, resource, *quantity);
            }
            info!(
                town = %config.name,
                agent = %id,
                x = config.position.x,
                y = config.position.y,
                resources = config.stock.len(),
                "Town founded"
            );
        }
        Ok(world)
    }

    /// Rebuild a world from saved towns.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the saved towns collide.
    pub fn from_towns(towns: Vec<Town>) -> Result<Self, WorldError> {
        let mut world = Self::new();
        for town in towns {
            world.insert(town)?;
        }
        Ok(world)
    }

    /// Add a town.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the id or the name is taken.
    pub fn insert(&mut self, town: Town) -> Result<AgentId, WorldError> {
        if self.towns.contains_key(&town.id) {
            return Err(WorldError::DuplicateId(town.id));
        }
        if self.find_by_name(&town.name).is_some() {
            return Err(WorldError::DuplicateName(town.name));
        }
        let id = town.id;
        self.towns.insert(id, town);
        Ok(id)
    }

    /// Look up a town by id.
    pub fn town(&self, id: AgentId) -> Option<&Town> {
        self.towns.get(&id)
    }

    /// Look up a town by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Town> {
        self.towns.values().find(|t| t.name == name)
    }

    /// All towns in id order.
    pub fn towns(&self) -> impl Iterator<Item = &Town> + '_ {
        self.towns.values()
    }

    /// All town ids in order.
    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.towns.keys().copied()
    }

    /// Number of towns.
    pub fn len(&self) -> usize {
        self.towns.len()
    }

    /// Whether the world has no towns.
    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }
}

impl DistanceOracle for World {
    fn distance(&self, a: AgentId, b: AgentId) -> f64 {
        match (self.towns.get(&a), self.towns.get(&b)) {
            (Some(from), Some(to)) => from.position.distance_to(to.position),
            _ => f64::INFINITY,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tradepost_types::ResourceId;

    use super::*;

    fn town(name: &str, x: f64, y: f64) -> TownConfig {
        TownConfig {
            name: name.to_owned(),
            position: Position { x, y },
            stock: BTreeMap::from([(ResourceId::from("wood"), 250)]),
        }
    }

    #[test]
    fn seed_creates_towns_and_stock() {
        let mut ledger = TownLedger::new();
        let world = World::seed(&[town("A", 0.0, 0.0), town("B", 3.0, 4.0)], &mut ledger).unwrap();

        assert_eq!(world.len(), 2);
        let a = world.find_by_name("A").unwrap().id;
        let b = world.find_by_name("B").unwrap().id;
        assert_eq!(ledger.balance(a, &ResourceId::from("wood")), 250);
        assert!((world.distance(a, b) - 5.0).abs() < f64::EPSILON);
        assert!((world.distance(b, a) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_town_is_infinitely_far() {
        let mut ledger = TownLedger::new();
        let world = World::seed(&[town("A", 0.0, 0.0)], &mut ledger).unwrap();
        let a = world.find_by_name("A").unwrap().id;
        assert!(world.distance(a, AgentId::new()).is_infinite());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut ledger = TownLedger::new();
        let result = World::seed(&[town("A", 0.0, 0.0), town("A", 1.0, 1.0)], &mut ledger);
        assert_eq!(result, Err(WorldError::DuplicateName("A".to_owned())));
    }

    #[test]
    fn from_towns_restores_ids() {
        let saved = Town {
            id: AgentId::new(),
            name: "A".to_owned(),
            position: Position { x: 1.0, y: 2.0 },
        };
        let world = World::from_towns(vec![saved.clone()]).unwrap();
        assert_eq!(world.town(saved.id), Some(&saved));
        assert_eq!(world.ids().collect::<Vec<_>>(), vec![saved.id]);
    }
}
