//! Plan step operations.

use std::sync::Arc;

use nbsync_types::{FieldMutation, Plan, PlanStep, PlanStepId};
use tracing::debug;

use crate::error::Result;
use crate::fields::Patchable;

/// What a successful [`create_step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInsert {
    /// Added (or moved) under a top-level parent.
    Nested,
    /// Added (or moved) to the top level.
    Appended,
    /// Replaced an existing step with the same id, in place.
    Replaced,
}

/// Insert a step into the plan.
///
/// A step whose `parent_step_uuid` names another top-level step is added to
/// that step's `sub_steps`. Anything else, including a step whose parent
/// can't be found or names the step itself, lives at the top level.
///
/// A step id appears at most once in the plan: re-creating a step under the
/// same parent replaces it in place, under a different parent moves it.
pub fn create_step(plan: &mut Plan, step: PlanStep) -> StepInsert {
    let parent = match step.parent_step_uuid {
        Some(parent_id) if parent_id == step.uuid => {
            debug!("plan step {:?} names itself as parent, keeping it top-level", step.uuid);
            None
        }
        Some(parent_id) => {
            let found = plan.steps.iter().position(|s| s.uuid == parent_id);
            if found.is_none() {
                debug!(
                    "parent {:?} of plan step {:?} not found, keeping it top-level",
                    parent_id, step.uuid
                );
            }
            found
        }
        None => None,
    };

    match parent {
        Some(p) => {
            if let Some(c) = plan.steps[p].sub_steps.iter().position(|s| s.uuid == step.uuid) {
                Arc::make_mut(&mut plan.steps[p]).sub_steps[c] = step;
                return StepInsert::Replaced;
            }
        }
        None => {
            if let Some(i) = plan.steps.iter().position(|s| s.uuid == step.uuid) {
                plan.steps[i] = Arc::new(step);
                return StepInsert::Replaced;
            }
        }
    }

    let parent_id = parent.map(|p| plan.steps[p].uuid);
    if remove_step(plan, &step.uuid) {
        debug!("moving plan step {:?} to parent {:?}", step.uuid, parent_id);
    }
    match parent_id.and_then(|id| plan.steps.iter_mut().find(|s| s.uuid == id)) {
        Some(parent) => {
            Arc::make_mut(parent).sub_steps.push(step);
            StepInsert::Nested
        }
        None => {
            plan.steps.push(Arc::new(step));
            StepInsert::Appended
        }
    }
}

/// Drop every copy of `id`, top-level or nested. Returns whether one existed.
fn remove_step(plan: &mut Plan, id: &PlanStepId) -> bool {
    let before = plan.steps.len();
    plan.steps.retain(|s| s.uuid != *id);
    let mut removed = plan.steps.len() != before;
    for parent in plan.steps.iter_mut() {
        if parent.sub_steps.iter().any(|s| s.uuid == *id) {
            Arc::make_mut(parent).sub_steps.retain(|s| s.uuid != *id);
            removed = true;
        }
    }
    removed
}

/// Apply a mutation to a top-level step.
///
/// Nested sub-steps are not searched. Returns `Ok(false)` when no top-level
/// step has the id.
pub fn update_step(plan: &mut Plan, id: &PlanStepId, mutation: &FieldMutation) -> Result<bool> {
    let Some(slot) = plan.steps.iter_mut().find(|s| s.uuid == *id) else {
        return Ok(false);
    };
    let mut updated = PlanStep::clone(slot);
    updated.apply_mutation(mutation)?;
    *slot = Arc::new(updated);
    Ok(true)
}
