use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use crate::auth::Role;
use crate::store::memory::Faults;
use crate::tests::helpers::{ids, TestApp};

async fn seed_workflow(app: &TestApp) -> Uuid {
    let gala = app.create_id("/api/v1/event-types", json!({"name": "Gala"})).await;
    let venue = app
        .create_id("/api/v1/task-templates", json!({"name": "Book venue"}))
        .await;
    let catering = app
        .create_id(
            "/api/v1/task-templates",
            json!({"name": "Confirm catering", "default_days_before_event": 14}),
        )
        .await;
    let banner = app
        .create_id(
            "/api/v1/design-item-types",
            json!({"name": "Banner", "default_production_days": 10, "default_shipping_days": 5}),
        )
        .await;

    let (status, body) = app
        .post(
            "/api/v1/workflows",
            json!({
                "name": "Gala prep",
                "event_type_ids": [gala],
                "actions": [
                    {"kind": "create_task", "task_template_id": venue, "days_before_event": 30},
                    {"kind": "create_task", "task_template_id": catering},
                    {"kind": "create_design_item", "design_item_type_id": banner}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    gala
}

#[tokio::test]
async fn test_creating_event_runs_workflows() {
    let app = TestApp::new();
    let gala = seed_workflow(&app).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/events",
            Some(Role::Member),
            Some(json!({"name": "Autumn Gala", "event_type_id": gala, "start_date": "2026-10-31"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let run = &body["workflow_runs"][0];
    assert_eq!(run["workflow_name"], "Gala prep");
    assert_eq!(run["outcome"], "executed");
    assert_eq!(ids(&run["execution"]["created_task_ids"]).len(), 2);
    assert_eq!(ids(&run["execution"]["created_design_item_ids"]).len(), 1);

    let event_id = body["event"]["id"].as_str().unwrap();
    let (status, detail) = app.get(&format!("/api/v1/events/{}", event_id)).await;
    assert_eq!(status, StatusCode::OK);

    let due_dates: Vec<&str> = detail["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["due_date"].as_str())
        .collect();
    assert!(due_dates.contains(&"2026-10-01"));
    assert!(due_dates.contains(&"2026-10-17"));

    let item = &detail["design_items"][0];
    assert_eq!(item["name"], "Banner - Autumn Gala");
    assert_eq!(item["in_hand_date"], "2026-10-31");
    assert_eq!(item["ship_date"], "2026-10-26");
    assert_eq!(item["production_due_date"], "2026-10-16");
}

#[tokio::test]
async fn test_event_is_created_even_when_workflow_fails() {
    let app = TestApp::new();
    let gala = seed_workflow(&app).await;
    app.store
        .inject_faults(Faults {
            fail_design_item_inserts: true,
            ..Faults::default()
        })
        .await;

    let (status, body) = app
        .post(
            "/api/v1/events",
            json!({"name": "Winter Gala", "event_type_id": gala, "start_date": "2026-12-12"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["workflow_runs"][0]["execution"]["status"], "failed");
    assert_eq!(app.store.task_count().await, 0);

    let event_id = body["event"]["id"].as_str().unwrap();
    let (status, _) = app.get(&format!("/api/v1/events/{}", event_id)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_manual_rerun_respects_idempotency() {
    let app = TestApp::new();
    let gala = seed_workflow(&app).await;
    let (_, body) = app
        .post(
            "/api/v1/events",
            json!({"name": "Summer Gala", "event_type_id": gala, "start_date": "2026-07-04"}),
        )
        .await;
    let rerun = format!("/api/v1/events/{}/run-workflows", body["event"]["id"].as_str().unwrap());

    let (status, runs) = app.request(Method::POST, &rerun, Some(Role::Manager), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs[0]["outcome"], "skipped");

    let (_, forced) = app.post(&rerun, json!({"force": true})).await;
    assert_eq!(forced[0]["outcome"], "executed");
    assert_eq!(forced[0]["execution"]["forced"], true);
    assert_eq!(forced[0]["execution"]["trigger_source"], "manual");
    assert_eq!(app.store.task_count().await, 4);
}

#[tokio::test]
async fn test_event_validation() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/v1/events",
            json!({
                "name": "",
                "event_type_id": Uuid::new_v4(),
                "start_date": "2026-07-04",
                "end_date": "2026-07-01",
                "status": "someday"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    for field in ["name", "event_type_id", "end_date", "status"] {
        assert!(body["details"].get(field).is_some(), "missing error for {}", field);
    }
}

#[tokio::test]
async fn test_list_events_filters_and_paginates() {
    let app = TestApp::new();
    let gala = app.create_id("/api/v1/event-types", json!({"name": "Gala"})).await;
    let dinner = app.create_id("/api/v1/event-types", json!({"name": "Dinner"})).await;
    for (type_id, start) in [(gala, "2026-01-10"), (gala, "2026-03-10"), (dinner, "2026-04-10")] {
        let (status, _) = app
            .post(
                "/api/v1/events",
                json!({"name": "Event", "event_type_id": type_id, "start_date": start}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .get(&format!("/api/v1/events?event_type_id={}&from=2026-02-01", gala))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["data"][0]["start_date"], "2026-03-10");

    let (_, first) = app.get("/api/v1/events?per_page=2").await;
    assert_eq!(first["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(first["meta"]["total_pages"], 2);
    assert_eq!(first["meta"]["has_next"], true);

    let (status, beyond) = app
        .get(&format!("/api/v1/events?page={}&per_page=100", i64::MAX))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beyond["data"].as_array().map(Vec::len), Some(0));
    assert_eq!(beyond["meta"]["total"], 3);
}
