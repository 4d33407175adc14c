use std::{collections::HashSet, fs, path::Path};

use dashmap::DashMap;
use log::debug;

use crate::{
    error::TargetsError,
    target::{PollResult, Target, TargetId},
};

/// Last known poll result per target, shared between the poller and readers.
///
/// Every write swaps a whole [PollResult] under the shard lock, so a reader
/// either sees the previous result or the new one, never a mix.
#[derive(Debug, Default)]
pub struct TargetStore {
    results: DashMap<TargetId, PollResult>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: PollResult) {
        self.results.insert(result.target_id, result);
    }

    pub fn get(&self, id: TargetId) -> Option<PollResult> {
        self.results.get(&id).map(|r| r.value().clone())
    }

    /// Copy of every entry, ordered by target id.
    pub fn snapshot(&self) -> Vec<PollResult> {
        let mut results: Vec<PollResult> =
            self.results.iter().map(|r| r.value().clone()).collect();
        results.sort_by_key(|r| r.target_id);
        results
    }

    pub fn prune(&self, id: TargetId) -> Option<PollResult> {
        self.results.remove(&id).map(|(_, result)| result)
    }

    /// Drops results of targets that are no longer managed.
    pub fn retain(&self, ids: &HashSet<TargetId>) {
        self.results.retain(|id, _| ids.contains(id));
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// In-memory list of managed targets. Safe to mutate while a cycle runs;
/// the poller only ever works on a [TargetRegistry::snapshot].
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: DashMap<TargetId, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let registry = Self::new();
        for target in targets {
            registry.add(target);
        }
        registry
    }

    /// Reads a json array of targets.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TargetsError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let targets: Vec<Target> = serde_json::from_str(&raw)?;
        debug!("loaded {} targets from {}", targets.len(), path.as_ref().display());
        Ok(Self::from_targets(targets))
    }

    /// Adds or replaces a target.
    pub fn add(&self, target: Target) {
        self.targets.insert(target.id, target);
    }

    pub fn remove(&self, id: TargetId) -> Option<Target> {
        self.targets.remove(&id).map(|(_, target)| target)
    }

    pub fn get(&self, id: TargetId) -> Option<Target> {
        self.targets.get(&id).map(|t| t.value().clone())
    }

    /// Copy of the current target list, ordered by id.
    pub fn snapshot(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self.targets.iter().map(|t| t.value().clone()).collect();
        targets.sort_by_key(|t| t.id);
        targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::RconStatus;

    fn target(id: TargetId) -> Target {
        Target {
            id,
            name: format!("server {id}"),
            host: "127.0.0.1".to_owned(),
            port: 27015,
            rcon_port: 27015,
            rcon_password: "pw".to_owned(),
        }
    }

    #[test]
    fn record_replaces_whole_result() {
        let store = TargetStore::new();
        store.record(PollResult::offline(1));

        let online = PollResult {
            reachable: true,
            rcon: RconStatus::Authenticated,
            players: 4,
            max_players: 16,
            map_name: "ttt_minecraft_b5".to_owned(),
            ..PollResult::offline(1)
        };
        store.record(online.clone());

        assert_eq!(store.get(1), Some(online));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_prune_removes() {
        let store = TargetStore::new();
        for id in [3, 1, 2] {
            store.record(PollResult::offline(id));
        }

        let ids: Vec<TargetId> = store.snapshot().iter().map(|r| r.target_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert!(store.prune(2).is_some());
        assert!(store.get(2).is_none());

        store.retain(&HashSet::from([1]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn registry_snapshot_is_a_copy() {
        let registry = TargetRegistry::from_targets([target(2), target(1)]);
        let snapshot = registry.snapshot();

        registry.remove(1);
        registry.add(target(5));

        assert_eq!(snapshot.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            registry.snapshot().iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![2, 5]
        );
    }
}
