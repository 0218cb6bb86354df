mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{TestApp, TestUser};

struct Fixture {
    t: TestApp,
    owner: TestUser,
    creator: TestUser,
    assignee: TestUser,
    outsider: TestUser,
    project: String,
    task: String,
}

/// Owner's project with `creator` as member, and a task by `creator` assigned to `assignee`.
async fn fixture() -> Result<Fixture> {
    let t = TestApp::new().await?;
    let owner = t.register("owner").await?;
    let creator = t.register("creator").await?;
    let assignee = t.register("assignee").await?;
    let outsider = t.register("outsider").await?;

    let project = t.create_project(&owner, "Platform", &[&creator]).await?;
    let task = t
        .create_task(&creator, &project, json!({ "assignedTo": assignee.id, "estimatedHours": 10.0 }))
        .await?;

    Ok(Fixture {
        t,
        owner,
        creator,
        assignee,
        outsider,
        project,
        task,
    })
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn task_visibility() -> Result<()> {
    let f = fixture().await?;
    let uri = format!("/api/tasks/{}", f.task);

    for user in [&f.owner, &f.creator, &f.assignee] {
        assert_eq!(f.t.get(&uri, user).await?.0, StatusCode::OK);
    }

    let (status, body) = f.t.get(&uri, &f.outsider).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized to access this task");

    let (status, body) = f.t.get(&uri, &f.assignee).await?;
    assert_eq!(status, StatusCode::OK);
    let watchers = ids(&body["data"]["watchers"]);
    assert!(watchers.contains(&f.creator.id));
    assert!(watchers.contains(&f.assignee.id));

    // developers list what they created or are assigned to
    let (_, body) = f.t.get("/api/tasks", &f.assignee).await?;
    assert_eq!(body["count"], 1);
    let (_, body) = f.t.get("/api/tasks", &f.owner).await?;
    assert_eq!(body["count"], 0);
    let (_, body) = f.t.get("/api/tasks", &f.outsider).await?;
    assert_eq!(body["count"], 0);

    // managers list tasks of projects they own or belong to
    let manager = f.t.user_with_role("mgr", "Manager").await?;
    let (_, body) = f.t.get("/api/tasks", &manager).await?;
    assert_eq!(body["count"], 0);
    f.t.set_role(&f.owner, "Manager").await?;
    let (_, body) = f.t.get(&format!("/api/tasks?project={}", f.project), &f.owner).await?;
    assert_eq!(body["count"], 1);

    Ok(())
}

#[tokio::test]
async fn assignee_may_only_touch_status_and_hours() -> Result<()> {
    let f = fixture().await?;
    let uri = format!("/api/tasks/{}", f.task);

    let (status, body) = f
        .t
        .put(&uri, &f.assignee, json!({ "status": "in-progress", "actualHours": 3.5 }))
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "in-progress");
    assert_eq!(body["data"]["progressPercentage"], 35.0);

    let (status, body) = f
        .t
        .put(&uri, &f.assignee, json!({ "status": "completed", "title": "Renamed" }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["details"]["fields"], json!(["title"]));

    // nothing from the denied request was applied
    let (_, body) = f.t.get(&uri, &f.creator).await?;
    assert_eq!(body["data"]["status"], "in-progress");
    assert_eq!(body["data"]["title"], "Write release notes");

    let (status, _) = f.t.put(&uri, &f.outsider, json!({ "status": "completed" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = f
        .t
        .put(&uri, &f.owner, json!({ "title": "Owner edit", "priority": "high", "dueDate": null }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Owner edit");
    assert_eq!(body["data"]["priority"], "high");

    let (status, _) = f.t.put(&uri, &f.creator, json!({ "status": "done" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn status_transitions_stamp_completion() -> Result<()> {
    let f = fixture().await?;
    let status_uri = format!("/api/tasks/{}/status", f.task);

    let (status, body) = f.t.patch(&status_uri, &f.assignee, json!({ "status": "completed" })).await?;
    assert_eq!(status, StatusCode::OK);
    let stamp = body["data"]["completedAt"].clone();
    assert!(stamp.is_string());

    // same-state write keeps the stamp
    let (_, body) = f.t.patch(&status_uri, &f.assignee, json!({ "status": "completed" })).await?;
    assert_eq!(body["data"]["completedAt"], stamp);

    let (_, body) = f.t.patch(&status_uri, &f.assignee, json!({ "status": "pending" })).await?;
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["completedAt"].is_null());

    let (status, body) = f.t.patch(&status_uri, &f.assignee, json!({ "status": "paused" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid status. Must be: pending, in-progress, or completed");

    assert_eq!(
        f.t.patch(&status_uri, &f.outsider, json!({ "status": "completed" })).await?.0,
        StatusCode::FORBIDDEN
    );

    Ok(())
}

#[tokio::test]
async fn history_records_each_change_newest_first() -> Result<()> {
    let f = fixture().await?;
    let task_uri = format!("/api/tasks/{}", f.task);

    f.t.patch(&format!("{task_uri}/status"), &f.assignee, json!({ "status": "completed" }))
        .await?;
    f.t.patch(&format!("{task_uri}/progress"), &f.assignee, json!({ "actualHours": 4 }))
        .await?;

    let (status, body) = f.t.get(&format!("{task_uri}/history"), &f.owner).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);

    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries[0]["action"], "updated");
    assert_eq!(entries[0]["field"], "actualHours");
    assert_eq!(entries[1]["action"], "status_changed");
    assert_eq!(entries[1]["oldValue"], "pending");
    assert_eq!(entries[1]["newValue"], "completed");
    assert_eq!(entries[1]["changedBy"], f.assignee.id.as_str());
    assert_eq!(entries[2]["action"], "created");

    let (_, body) = f.t.get(&format!("{task_uri}/history?limit=1"), &f.owner).await?;
    assert_eq!(body["count"], 1);

    let (status, body) = f
        .t
        .patch(&format!("{task_uri}/progress"), &f.assignee, json!({ "actualHours": -1 }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    assert_eq!(
        f.t.get(&format!("{task_uri}/history"), &f.outsider).await?.0,
        StatusCode::FORBIDDEN
    );

    Ok(())
}

#[tokio::test]
async fn assignment_rules_and_watchers() -> Result<()> {
    let f = fixture().await?;
    let task_uri = format!("/api/tasks/{}", f.task);
    let newcomer = f.t.register("newcomer").await?;

    let (status, _) = f
        .t
        .patch(&format!("{task_uri}/assign"), &f.assignee, json!({ "userId": newcomer.id }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = f
        .t
        .patch(&format!("{task_uri}/assign"), &f.owner, json!({ "userId": newcomer.id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["assignedTo"], newcomer.id.as_str());
    assert!(ids(&body["data"]["watchers"]).contains(&newcomer.id));

    let (status, body) = f.t.patch(&format!("{task_uri}/assign"), &f.creator, json!({ "userId": null })).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["assignedTo"].is_null());

    let (_, body) = f.t.get(&format!("{task_uri}/history?limit=2"), &f.creator).await?;
    assert_eq!(body["data"][0]["action"], "unassigned");
    assert_eq!(body["data"][1]["action"], "assigned");

    // the creator can never stop watching
    let (status, _) = f
        .t
        .delete(&format!("{task_uri}/watchers/{}", f.creator.id), &f.owner)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = f
        .t
        .post(&format!("{task_uri}/watchers"), &f.owner, json!({ "userId": f.owner.id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&body["data"]["watchers"]).contains(&f.owner.id));

    let (status, body) = f
        .t
        .delete(&format!("{task_uri}/watchers/{}", f.owner.id), &f.owner)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(!ids(&body["data"]["watchers"]).contains(&f.owner.id));

    let (status, _) = f.t.post(&format!("{task_uri}/watchers"), &f.owner, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn comments_and_deletion() -> Result<()> {
    let f = fixture().await?;
    let task_uri = format!("/api/tasks/{}", f.task);

    let (status, _) = f
        .t
        .post(&format!("{task_uri}/comments"), &f.assignee, json!({ "content": "   " }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = f
        .t
        .post(&format!("{task_uri}/comments"), &f.assignee, json!({ "content": "x".repeat(501) }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = f
        .t
        .post(&format!("{task_uri}/comments"), &f.assignee, json!({ "content": "Looks good to me" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["comments"][0]["content"], "Looks good to me");
    assert_eq!(body["data"]["comments"][0]["author"], f.assignee.id.as_str());

    let (_, body) = f.t.get(&format!("{task_uri}/history?limit=1"), &f.owner).await?;
    assert_eq!(body["data"][0]["action"], "comment_added");

    // the assignee may not delete; the project owner may
    assert_eq!(f.t.delete(&task_uri, &f.assignee).await?.0, StatusCode::FORBIDDEN);
    assert_eq!(f.t.delete(&task_uri, &f.owner).await?.0, StatusCode::OK);
    assert_eq!(f.t.get(&task_uri, &f.owner).await?.0, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn task_creation_validation() -> Result<()> {
    let f = fixture().await?;

    let (status, body) = f
        .t
        .post("/api/tasks", &f.creator, json!({ "title": "No project", "description": "d" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Title, description, and project are required");

    let (status, _) = f
        .t
        .post(
            "/api/tasks",
            &f.outsider,
            json!({ "title": "t", "description": "d", "project": f.project }),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f
        .t
        .post(
            "/api/tasks",
            &f.creator,
            json!({ "title": "t", "description": "d", "project": f.project, "estimatedHours": -2 }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a Manager needs no membership to create tasks
    let manager = f.t.user_with_role("mgr", "Manager").await?;
    let (status, _) = f
        .t
        .post(
            "/api/tasks",
            &manager,
            json!({ "title": "t", "description": "d", "project": f.project }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}
