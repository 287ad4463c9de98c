//! Per-session stage data store

use crate::errors::{HubError, HubResult};
use crate::models::{StageId, StageOutput};
use std::collections::BTreeMap;

/// Keyed map of stage outputs, last write wins per stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageDataStore {
    outputs: BTreeMap<StageId, StageOutput>,
}

impl StageDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: StageId) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    /// Store `output` for `stage`; the output variant must belong to `stage`
    pub fn set(&mut self, stage: StageId, output: StageOutput) -> HubResult<()> {
        if output.stage() != stage {
            return Err(HubError::validation(format!(
                "Output for stage '{}' cannot be recorded under stage '{}'",
                output.stage(),
                stage
            )));
        }
        self.outputs.insert(stage, output);
        Ok(())
    }

    pub fn remove(&mut self, stage: StageId) -> Option<StageOutput> {
        self.outputs.remove(&stage)
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.outputs.contains_key(&stage)
    }

    /// Drop every output belonging to a stage after `stage`; returns the dropped stages
    pub fn invalidate_after(&mut self, stage: StageId) -> Vec<StageId> {
        let later: Vec<StageId> = self
            .outputs
            .keys()
            .copied()
            .filter(|s| s.index() > stage.index())
            .collect();
        for s in &later {
            self.outputs.remove(s);
        }
        later
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Outputs in pipeline order
    pub fn iter(&self) -> impl Iterator<Item = (StageId, &StageOutput)> {
        self.outputs.iter().map(|(stage, output)| (*stage, output))
    }

    pub fn to_map(&self) -> BTreeMap<StageId, StageOutput> {
        self.outputs.clone()
    }

    /// Rebuild a store, dropping entries whose variant does not match their key
    pub fn from_map(map: BTreeMap<StageId, StageOutput>) -> Self {
        let outputs = map
            .into_iter()
            .filter(|(stage, output)| output.stage() == *stage)
            .collect();
        Self { outputs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditPlan, StoryOutline};

    fn story() -> StageOutput {
        StageOutput::Story(StoryOutline {
            title: "t".to_string(),
            outline: "o".to_string(),
            acts: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            characters: vec![],
            setting: String::new(),
        })
    }

    fn edit() -> StageOutput {
        StageOutput::Edit(EditPlan {
            sequence: vec!["scene-1".to_string()],
            transitions: vec!["cut".to_string()],
            music_suggestions: vec![],
        })
    }

    #[test]
    fn test_set_then_get() {
        let mut store = StageDataStore::new();
        store.set(StageId::Story, story()).unwrap();
        assert_eq!(store.get(StageId::Story), Some(&story()));
        assert!(store.get(StageId::Script).is_none());
    }

    #[test]
    fn test_mismatched_variant_rejected() {
        let mut store = StageDataStore::new();
        let err = store.set(StageId::Script, story()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_after() {
        let mut store = StageDataStore::new();
        store.set(StageId::Story, story()).unwrap();
        store.set(StageId::Edit, edit()).unwrap();

        let dropped = store.invalidate_after(StageId::Story);
        assert_eq!(dropped, vec![StageId::Edit]);
        assert!(store.contains(StageId::Story));
        assert!(!store.contains(StageId::Edit));
    }

    #[test]
    fn test_clear() {
        let mut store = StageDataStore::new();
        store.set(StageId::Story, story()).unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
