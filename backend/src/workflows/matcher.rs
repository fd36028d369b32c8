// Workflow Matcher - picks the definitions that apply to an event type

use keystone_shared::WorkflowDefinition;
use uuid::Uuid;

/// Active definitions whose applicability set contains `event_type_id`,
/// in execution order (ties broken by name).
pub fn matching_workflows(definitions: &[WorkflowDefinition], event_type_id: Uuid) -> Vec<&WorkflowDefinition> {
    let mut matched: Vec<&WorkflowDefinition> = definitions
        .iter()
        .filter(|d| d.workflow.is_active && d.applies_to(event_type_id))
        .collect();

    matched.sort_by(|a, b| {
        (a.workflow.execution_order, &a.workflow.name).cmp(&(b.workflow.execution_order, &b.workflow.name))
    });
    matched
}
