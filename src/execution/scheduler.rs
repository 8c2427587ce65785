//! Dependency bookkeeping - determines which stages can run next

use crate::core::{PipelineDefinition, StageDefinition};
use std::collections::HashSet;

/// Tracks completed and in-flight stages of one run
///
/// A stage is ready when it is neither completed nor in flight and every
/// stage it depends on has completed, successfully or not.
#[derive(Debug)]
pub struct StageTracker<'a> {
    definition: &'a PipelineDefinition,
    completed: HashSet<String>,
    in_flight: HashSet<String>,
}

impl<'a> StageTracker<'a> {
    pub fn new(definition: &'a PipelineDefinition) -> Self {
        Self {
            definition,
            completed: HashSet::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Stages ready to launch, in definition order
    pub fn ready(&self) -> Vec<&'a StageDefinition> {
        self.definition
            .stages
            .iter()
            .filter(|s| !self.completed.contains(&s.name) && !self.in_flight.contains(&s.name))
            .filter(|s| s.dependencies_met(&self.completed))
            .collect()
    }

    pub fn start(&mut self, stage: &str) {
        self.in_flight.insert(stage.to_string());
    }

    pub fn complete(&mut self, stage: &str) {
        self.in_flight.remove(stage);
        self.completed.insert(stage.to_string());
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_complete(&self) -> bool {
        self.definition
            .stages
            .iter()
            .all(|s| self.completed.contains(&s.name))
    }

    /// Stages not yet completed, in definition order
    pub fn remaining(&self) -> Vec<String> {
        self.definition
            .stages
            .iter()
            .filter(|s| !self.completed.contains(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }
}

/// Group stages into waves that could run in parallel
///
/// Each wave only depends on earlier waves. Stages caught in a cycle, or
/// depending on an unknown stage, appear in no wave.
pub fn execution_levels(definition: &PipelineDefinition) -> Vec<Vec<String>> {
    let mut tracker = StageTracker::new(definition);
    let mut levels = Vec::new();

    loop {
        let wave: Vec<String> = tracker.ready().iter().map(|s| s.name.clone()).collect();
        if wave.is_empty() {
            break;
        }
        for name in &wave {
            tracker.complete(name);
        }
        levels.push(wave);
    }

    levels
}

/// Find a dependency cycle, returned as the path that closes it
pub fn find_cycle(definition: &PipelineDefinition) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut path = Vec::new();

    for stage in &definition.stages {
        if !visited.contains(&stage.name) {
            if let Some(cycle) = dfs_check(definition, &stage.name, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
    }

    None
}

fn dfs_check(
    definition: &PipelineDefinition,
    stage_name: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(stage_name.to_string());
    path.push(stage_name.to_string());

    if let Some(stage) = definition.stage(stage_name) {
        for dep in &stage.depends_on {
            if let Some(pos) = path.iter().position(|s| s == dep) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_check(definition, dep, visited, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    None
}
