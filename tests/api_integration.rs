mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn alice_and_bob_walkthrough() -> Result<()> {
    let t = TestApp::new().await?;
    let alice = t.register("alice").await?;
    let bob = t.register("bob").await?;
    let admin = t.user_with_role("admin", "Admin").await?;

    // -- Alice creates a project
    let (status, body) = t
        .post("/api/projects", &alice, json!({ "title": "T", "description": "D" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["owner"], alice.id.as_str());
    assert_eq!(body["data"]["members"], json!([alice.id]));
    let project = body["data"]["id"].as_str().unwrap().to_string();

    // -- Bob cannot see it
    let (status, _) = t.get(&format!("/api/projects/{project}"), &bob).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- Bob joins, gets a task and completes it
    let (status, _) = t
        .post(&format!("/api/projects/{project}/members"), &alice, json!({ "userId": bob.id }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let task = t.create_task(&alice, &project, json!({ "assignedTo": bob.id })).await?;

    let (status, body) = t
        .patch(&format!("/api/tasks/{task}/status"), &bob, json!({ "status": "completed" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["completedAt"].is_string());

    let (_, body) = t.get(&format!("/api/tasks/{task}/history"), &bob).await?;
    let status_changes = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| entry["action"] == "status_changed")
        .count();
    assert_eq!(status_changes, 1);

    // -- Admin cannot change their own role
    let (status, body) = t
        .patch(&format!("/api/users/{}/role", admin.id), &admin, json!({ "role": "Developer" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot change your own role");

    // -- deleting the project leaves no tasks or history behind
    let (status, _) = t.delete(&format!("/api/projects/{project}"), &alice).await?;
    assert_eq!(status, StatusCode::OK);

    let remaining_tasks: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM tasks").fetch_one(&t.pool).await?;
    let remaining_logs: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM task_logs").fetch_one(&t.pool).await?;
    let remaining_watchers: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM task_watchers").fetch_one(&t.pool).await?;
    assert_eq!((remaining_tasks, remaining_logs, remaining_watchers), (0, 0, 0));

    Ok(())
}

#[tokio::test]
async fn creator_keeps_assignment_rights_after_leaving_project() -> Result<()> {
    let t = TestApp::new().await?;
    let owner = t.register("owner").await?;
    let creator = t.register("creator").await?;
    let helper = t.register("helper").await?;

    let project = t.create_project(&owner, "Ops", &[&creator]).await?;
    let task = t.create_task(&creator, &project, json!({})).await?;

    let (status, _) = t
        .delete(&format!("/api/projects/{project}/members/{}", creator.id), &owner)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .patch(&format!("/api/tasks/{task}/assign"), &creator, json!({ "userId": helper.id }))
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["assignedTo"], helper.id.as_str());

    Ok(())
}

#[tokio::test]
async fn completed_at_tracks_status_through_put_updates() -> Result<()> {
    let t = TestApp::new().await?;
    let owner = t.register("owner").await?;
    let project = t.create_project(&owner, "Flow", &[]).await?;
    let task = t.create_task(&owner, &project, json!({})).await?;
    let uri = format!("/api/tasks/{task}");

    let (_, body) = t.put(&uri, &owner, json!({ "status": "completed" })).await?;
    assert!(body["data"]["completedAt"].is_string());

    let (_, body) = t.put(&uri, &owner, json!({ "status": "in-progress" })).await?;
    assert!(body["data"]["completedAt"].is_null());

    let (_, body) = t
        .put(&uri, &owner, json!({ "estimatedHours": 8, "dueDate": "2030-01-01T00:00:00Z", "tags": ["Ops", "ops", " infra "] }))
        .await?;
    assert_eq!(body["data"]["estimatedHours"], 8.0);
    assert_eq!(body["data"]["isOverdue"], false);

    let (_, body) = t.put(&uri, &owner, json!({ "dueDate": null })).await?;
    assert!(body["data"]["dueDate"].is_null());

    let (_, body) = t.get(&format!("{uri}/history"), &owner).await?;
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions.first(), Some(&"due_date_changed"));
    assert_eq!(actions.last(), Some(&"created"));
    assert_eq!(actions.iter().filter(|a| **a == "status_changed").count(), 2);

    Ok(())
}
