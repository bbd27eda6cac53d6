//! Step grouping: partitions a workflow's steps into execution batches.
//!
//! Groups run one after another; the steps inside a group run concurrently.
//! A group is a list of indices into the workflow's step slice, so results
//! can always be written back to the step's declaration position.
//!
//! Two strategies:
//! 1. Adjacency ([`group_steps`]), the default: a `parallel` step joins the
//!    group that precedes it, any other step starts a new group.
//! 2. Dependency waves ([`plan_dependency_waves`]), used as soon as any step
//!    declares `dependencies`: Kahn's algorithm layered by depth, so every
//!    step runs in the first wave after all of its predecessors.

use std::collections::{HashMap, HashSet};

use crate::{EngineError, models::WorkflowStep};

/// Indices into a step slice that execute together.
pub type StepGroup = Vec<usize>;

/// Adjacency grouping.
///
/// Size- and order-preserving: flattening the result yields `0..steps.len()`.
pub fn group_steps(steps: &[WorkflowStep]) -> Vec<StepGroup> {
    let mut groups: Vec<StepGroup> = Vec::new();
    let mut current: StepGroup = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if step.parallel && !current.is_empty() {
            current.push(index);
        } else {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            current.push(index);
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Layer steps into waves from their declared `dependencies`.
///
/// Each wave lists its steps in declaration order.
///
/// # Errors
/// - [`EngineError::DuplicateStepName`] if two steps share a name.
/// - [`EngineError::UnknownDependency`] if a dependency names no step.
/// - [`EngineError::CycleDetected`] if the dependencies cannot be ordered.
pub fn plan_dependency_waves(steps: &[WorkflowStep]) -> Result<Vec<StepGroup>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Step names must be unique to be referenced
    // -----------------------------------------------------------------------
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        if index_of.insert(step.name.as_str(), index).is_some() {
            return Err(EngineError::DuplicateStepName(step.name.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Resolve dependency names, building in-degrees and dependents
    // -----------------------------------------------------------------------
    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (index, step) in steps.iter().enumerate() {
        let mut seen: HashSet<usize> = HashSet::new();
        for dependency in &step.dependencies {
            let &predecessor =
                index_of
                    .get(dependency.as_str())
                    .ok_or_else(|| EngineError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    })?;
            if seen.insert(predecessor) {
                in_degree[index] += 1;
                dependents[predecessor].push(index);
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Kahn's algorithm, one wave per depth level
    // -----------------------------------------------------------------------
    let mut wave: StepGroup = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut waves: Vec<StepGroup> = Vec::new();
    let mut visited = 0usize;

    while !wave.is_empty() {
        let mut next: StepGroup = Vec::new();
        for &index in &wave {
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        visited += wave.len();
        waves.push(std::mem::replace(&mut wave, next));
    }

    // Anything left unvisited sits on a cycle.
    if visited != steps.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(waves)
}

/// Pick the grouping strategy for `steps`: dependency waves when any step
/// declares dependencies, adjacency otherwise.
pub fn plan_step_groups(steps: &[WorkflowStep]) -> Result<Vec<StepGroup>, EngineError> {
    if steps.iter().any(|step| !step.dependencies.is_empty()) {
        plan_dependency_waves(steps)
    } else {
        Ok(group_steps(steps))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn steps_from_flags(flags: &[bool]) -> Vec<WorkflowStep> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &parallel)| WorkflowStep {
                parallel,
                ..WorkflowStep::shell(format!("step-{i}"), "true", &[])
            })
            .collect()
    }

    fn group_sizes(groups: &[StepGroup]) -> Vec<usize> {
        groups.iter().map(Vec::len).collect()
    }

    fn names<'a>(steps: &'a [WorkflowStep], groups: &[StepGroup]) -> Vec<Vec<&'a str>> {
        groups
            .iter()
            .map(|g| g.iter().map(|&i| steps[i].name.as_str()).collect())
            .collect()
    }

    #[test]
    fn sequential_steps_are_isolated() {
        let groups = group_steps(&steps_from_flags(&[false, false, false]));
        assert_eq!(group_sizes(&groups), vec![1, 1, 1]);
    }

    #[test]
    fn all_parallel_steps_form_one_group() {
        let groups = group_steps(&steps_from_flags(&[true, true, true]));
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn parallel_steps_join_the_preceding_group() {
        let groups = group_steps(&steps_from_flags(&[false, true, true, false]));
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_steps(&[]).is_empty());
    }

    #[test]
    fn grouping_preserves_size_and_order() {
        let patterns: &[&[bool]] = &[
            &[],
            &[true],
            &[false],
            &[true, false, true, true, false, false, true],
            &[false, true, false, true, false, true],
            &[true, true, false, true],
        ];
        for flags in patterns {
            let flattened: Vec<usize> = group_steps(&steps_from_flags(flags)).concat();
            assert_eq!(flattened, (0..flags.len()).collect::<Vec<_>>(), "flags {flags:?}");
        }
    }

    #[test]
    fn linear_dependencies_become_one_wave_each() {
        // a → b → c
        let steps = vec![
            WorkflowStep::shell("a", "true", &[]),
            WorkflowStep::shell("b", "true", &[]).after("a"),
            WorkflowStep::shell("c", "true", &[]).after("b"),
        ];
        let waves = plan_dependency_waves(&steps).expect("should be valid");
        assert_eq!(names(&steps, &waves), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_dependencies_share_the_middle_wave() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let steps = vec![
            WorkflowStep::shell("d", "true", &[]).after("b").after("c"),
            WorkflowStep::shell("b", "true", &[]).after("a"),
            WorkflowStep::shell("c", "true", &[]).after("a"),
            WorkflowStep::shell("a", "true", &[]),
        ];
        let waves = plan_step_groups(&steps).expect("should be valid");
        assert_eq!(names(&steps, &waves), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn independent_steps_run_in_the_first_wave() {
        let steps = vec![
            WorkflowStep::shell("lint", "true", &[]),
            WorkflowStep::shell("build", "true", &[]),
            WorkflowStep::shell("test", "true", &[]).after("build"),
        ];
        let waves = plan_step_groups(&steps).unwrap();
        assert_eq!(waves, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn duplicate_step_name_is_rejected() {
        let steps = vec![
            WorkflowStep::shell("a", "true", &[]),
            WorkflowStep::shell("a", "true", &[]).after("a"),
        ];
        assert!(matches!(
            plan_dependency_waves(&steps),
            Err(EngineError::DuplicateStepName(name)) if name == "a"
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let steps = vec![WorkflowStep::shell("a", "true", &[]).after("ghost")];
        assert!(matches!(
            plan_step_groups(&steps),
            Err(EngineError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // a → b → c → a
        let steps = vec![
            WorkflowStep::shell("a", "true", &[]).after("c"),
            WorkflowStep::shell("b", "true", &[]).after("a"),
            WorkflowStep::shell("c", "true", &[]).after("b"),
        ];
        assert!(matches!(plan_step_groups(&steps), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn without_dependencies_duplicate_names_are_fine() {
        let steps = steps_from_flags(&[false, false]);
        let steps = vec![
            WorkflowStep { name: "same".into(), ..steps[0].clone() },
            WorkflowStep { name: "same".into(), ..steps[1].clone() },
        ];
        assert_eq!(plan_step_groups(&steps).unwrap(), vec![vec![0], vec![1]]);
    }
}
