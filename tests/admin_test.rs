use axum::http::StatusCode;

mod common;

use common::{body_json, create_test_app, request, seed_lessons, seed_profile, token_for};
use tutor_backend::services::alerts::AlertSeverity;

#[tokio::test]
async fn test_admin_dashboard_requires_admin_role() {
    let app = create_test_app();
    seed_profile(&app.store, "learner", "user");

    let response = app
        .send(request("GET", "/api/admin/dashboard", Some(&token_for("learner")), None))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_admin_dashboard_aggregates() {
    let app = create_test_app();
    seed_profile(&app.store, "boss", "admin");
    seed_profile(&app.store, "learner", "user");
    seed_lessons(&app.store, 3);

    let learner = token_for("learner");
    app.send(request("POST", "/api/lessons/lesson-0/start", Some(&learner), None))
        .await;
    app.send(request(
        "PUT",
        "/api/lessons/lesson-0/progress",
        Some(&learner),
        Some(serde_json::json!({ "progressPercentage": 100 })),
    ))
    .await;
    app.send(request("POST", "/api/lessons/lesson-2/start", Some(&learner), None))
        .await;

    let response = app
        .send(request("GET", "/api/admin/dashboard", Some(&token_for("boss")), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();

    assert_eq!(data["totalUsers"], 2);
    assert_eq!(data["totalLessons"], 3);
    assert_eq!(data["completionRate"], 50.0);
    assert_eq!(data["lessonViews"], serde_json::json!({ "status": "pending" }));
    assert_eq!(data["degradedSources"], serde_json::json!([]));
    assert_eq!(data["topLessons"][0]["lessonId"], "lesson-0");
    assert_eq!(data["topLessons"][0]["completions"], 1);
    assert_eq!(data["lessonsByCategory"][0]["key"], "science");
    assert_eq!(data["lessonsByCategory"][0]["count"], 2);
}

#[tokio::test]
async fn test_alerts_list_and_resolve() {
    let app = create_test_app();
    seed_profile(&app.store, "boss", "admin");
    let admin = token_for("boss");

    let raised = app
        .state
        .alerts()
        .raise("llm", AlertSeverity::Warning, "completions are slow");

    let response = app.send(request("GET", "/api/admin/alerts", Some(&admin), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["active"].as_array().unwrap().len(), 1);
    assert_eq!(data["active"][0]["source"], "llm");

    let response = app
        .send(request(
            "PUT",
            &format!("/api/admin/alerts/{}/resolve", raised.id),
            Some(&admin),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "resolved");
    assert_eq!(app.state.alerts().active_count(), 0);

    let response = app
        .send(request(
            "PUT",
            &format!("/api/admin/alerts/{}/resolve", raised.id),
            Some(&admin),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alert_resolution_forbidden_for_users() {
    let app = create_test_app();
    let raised = app.state.alerts().raise("llm", AlertSeverity::Error, "down");

    let response = app
        .send(request(
            "PUT",
            &format!("/api/admin/alerts/{}/resolve", raised.id),
            Some(&token_for("learner")),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.state.alerts().active_count(), 1);
}

#[tokio::test]
async fn test_user_dashboard_reflects_own_progress() {
    let app = create_test_app();
    seed_lessons(&app.store, 2);
    let learner = token_for("learner");

    app.send(request("POST", "/api/lessons/lesson-0/start", Some(&learner), None))
        .await;
    app.send(request(
        "PUT",
        "/api/lessons/lesson-0/progress",
        Some(&learner),
        Some(serde_json::json!({ "progressPercentage": 100 })),
    ))
    .await;

    let other = token_for("someone-else");
    app.send(request("POST", "/api/lessons/lesson-0/start", Some(&other), None))
        .await;

    let response = app.send(request("GET", "/api/dashboard", Some(&learner), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["lessonsCompleted"], 1);
    assert_eq!(data["lessonsInProgress"], 0);
    assert_eq!(data["degradedSources"], serde_json::json!([]));
}
