use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Role;
use crate::tests::helpers::{create_test_jwt, TestApp};

struct Catalogue {
    gala: Uuid,
    venue: Uuid,
    banner: Uuid,
}

async fn seed_catalogue(app: &TestApp) -> Catalogue {
    Catalogue {
        gala: app.create_id("/api/v1/event-types", json!({"name": "Gala"})).await,
        venue: app
            .create_id(
                "/api/v1/task-templates",
                json!({"name": "Book venue", "priority": "high", "default_days_before_event": 60}),
            )
            .await,
        banner: app
            .create_id(
                "/api/v1/design-item-types",
                json!({"name": "Banner", "default_production_days": 10, "default_shipping_days": 5}),
            )
            .await,
    }
}

fn gala_workflow(c: &Catalogue) -> Value {
    json!({
        "name": "Gala prep",
        "event_type_ids": [c.gala],
        "actions": [
            {"kind": "create_task", "task_template_id": c.venue},
            {"kind": "create_design_item", "design_item_type_id": c.banner, "days_before_event": 3}
        ]
    })
}

async fn create_event(app: &TestApp, type_id: Uuid, start: &str) -> Value {
    let (status, body) = app
        .post(
            "/api/v1/events",
            json!({"name": "Spring Gala", "event_type_id": type_id, "start_date": start}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn test_create_and_fetch_workflow() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;

    let (status, created) = app.post("/api/v1/workflows", gala_workflow(&c)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["is_active"], true);
    assert_eq!(created["actions"][1]["position"], 1);

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = app.get(&format!("/api/v1/workflows/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Gala prep");
    assert_eq!(fetched["event_type_ids"][0], c.gala.to_string());
}

#[tokio::test]
async fn test_invalid_workflow_reports_action_fields() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;

    let (status, body) = app
        .post(
            "/api/v1/workflows",
            json!({
                "name": "Broken",
                "event_type_ids": [c.gala],
                "actions": [
                    {"kind": "create_task"},
                    {"kind": "create_design_item", "design_item_type_id": c.banner, "shipping_days": 999}
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"].get("actions[0].task_template_id").is_some());
    assert!(body["details"].get("actions[1].shipping_days").is_some());
}

#[tokio::test]
async fn test_member_cannot_manage_workflows() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;

    let (status, _) = app
        .request(Method::POST, "/api/v1/workflows", Some(Role::Member), Some(gala_workflow(&c)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_and_delete_workflow() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;
    let (_, created) = app.post("/api/v1/workflows", gala_workflow(&c)).await;
    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    let mut replacement = gala_workflow(&c);
    replacement["name"] = json!("Gala prep v2");
    replacement["is_active"] = json!(false);
    let (status, updated) = app
        .request(Method::PUT, &uri, Some(Role::Admin), Some(replacement))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["is_active"], false);

    let (status, _) = app.request(Method::DELETE, &uri, Some(Role::Manager), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workflows_are_tenant_isolated() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;
    let (_, created) = app.post("/api/v1/workflows", gala_workflow(&c)).await;
    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    let outsider = Some(create_test_jwt(Uuid::new_v4(), Role::Admin));
    let (status, _) = app.request_as(Method::GET, &uri, outsider.clone(), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request_as(Method::DELETE, &uri, outsider.clone(), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = app
        .request_as(Method::GET, "/api/v1/workflows", outsider, None)
        .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_apply_to_existing_events() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;

    // Events created before the workflow exists trigger nothing
    create_event(&app, c.gala, "2099-05-01").await;
    create_event(&app, c.gala, "2000-05-01").await;
    assert_eq!(app.store.task_count().await, 0);

    let (_, workflow) = app.post("/api/v1/workflows", gala_workflow(&c)).await;
    let apply = format!("/api/v1/workflows/{}/apply", workflow["id"].as_str().unwrap());

    let (status, dry) = app.post(&apply, json!({"dry_run": true})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dry["would_apply"], 1);
    assert_eq!(app.store.task_count().await, 0);

    // Empty body means default options
    let (status, report) = app.request(Method::POST, &apply, Some(Role::Manager), None).await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["events_considered"], 1);
    assert_eq!(report["applied"], 1);
    assert_eq!(report["runs"][0]["outcome"], "executed");
    assert_eq!(report["runs"][0]["execution"]["status"], "completed");
    assert_eq!(app.store.task_count().await, 1);
    assert_eq!(app.store.design_item_count().await, 1);

    let (_, again) = app.post(&apply, json!({"include_past_events": true})).await;
    assert_eq!(again["applied"], 1);
    assert_eq!(again["skipped"], 1);

    let (_, forced) = app.post(&apply, json!({"include_past_events": true, "force": true})).await;
    assert_eq!(forced["applied"], 2);
    assert_eq!(app.store.task_count().await, 4);
}

#[tokio::test]
async fn test_apply_inactive_workflow_conflicts() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;
    let mut body = gala_workflow(&c);
    body["is_active"] = json!(false);
    let (_, workflow) = app.post("/api/v1/workflows", body).await;

    let (status, error) = app
        .post(&format!("/api/v1/workflows/{}/apply", workflow["id"].as_str().unwrap()), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "CONFLICT");
}

#[tokio::test]
async fn test_apply_rejects_malformed_options() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;
    let (_, workflow) = app.post("/api/v1/workflows", gala_workflow(&c)).await;

    let (status, _) = app
        .post(
            &format!("/api/v1/workflows/{}/apply", workflow["id"].as_str().unwrap()),
            json!({"dry_run": "yes please"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_apply_all_and_execution_history() {
    let app = TestApp::new();
    let c = seed_catalogue(&app).await;
    let (_, workflow) = app.post("/api/v1/workflows", gala_workflow(&c)).await;
    let workflow_id = workflow["id"].as_str().unwrap().to_string();
    create_event(&app, c.gala, "2099-01-15").await;

    let (status, reports) = app.post("/api/v1/workflows/apply-existing", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports[0]["workflow_id"], workflow_id.as_str());
    // Already applied when the event was created
    assert_eq!(reports[0]["skipped"], 1);

    let (status, history) = app
        .get(&format!("/api/v1/workflows/{}/executions", workflow_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["meta"]["total"], 1);
    assert_eq!(history["data"][0]["trigger_source"], "event_created");

    let (status, filtered) = app
        .get(&format!(
            "/api/v1/workflow-executions?workflow_id={}&status=failed",
            workflow_id
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered["meta"]["total"], 0);
}
