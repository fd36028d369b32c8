// Relative scheduling: turns an action's day offsets into concrete dates
// anchored on the event start date.

use chrono::{Duration, NaiveDate};
use keystone_shared::{DesignItemType, Event, TaskTemplate, WorkflowAction};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskPlan {
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesignItemPlan {
    pub assigned_to: Option<Uuid>,
    pub production_due_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub in_hand_date: NaiveDate,
}

fn days_before(date: NaiveDate, days: i32) -> NaiveDate {
    date - Duration::days(i64::from(days))
}

/// Action offset wins over the template default; no offset means no due date.
pub fn plan_task(event: &Event, action: &WorkflowAction, template: &TaskTemplate) -> TaskPlan {
    let offset = action.days_before_event.or(template.default_days_before_event);

    TaskPlan {
        assigned_to: action.assignee_id.or(template.default_assignee_id),
        due_date: offset.map(|days| days_before(event.start_date, days)),
    }
}

/// Works backwards from the in-hand date: ship before it, produce before shipping.
pub fn plan_design_item(event: &Event, action: &WorkflowAction, item_type: &DesignItemType) -> DesignItemPlan {
    let in_hand_date = days_before(event.start_date, action.days_before_event.unwrap_or(0));
    let shipping_days = action.shipping_days.unwrap_or(item_type.default_shipping_days);
    let production_days = action.production_days.unwrap_or(item_type.default_production_days);

    let ship_date = days_before(in_hand_date, shipping_days);
    let production_due_date = days_before(ship_date, production_days);

    DesignItemPlan {
        assigned_to: action.assignee_id,
        production_due_date,
        ship_date,
        in_hand_date,
    }
}
