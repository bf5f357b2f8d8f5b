use axum::http::StatusCode;

mod common;

use common::{body_json, create_test_app, request, seed_lessons, token_for};

fn states(list: &serde_json::Value) -> Vec<String> {
    list["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["state"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_fresh_learner_sees_only_first_lesson_unlocked() {
    let app = create_test_app();
    seed_lessons(&app.store, 5);

    let response = app
        .send(request("GET", "/api/lessons", Some(&token_for("learner")), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(states(&list), vec!["unlocked", "locked", "locked", "locked", "locked"]);
}

#[tokio::test]
async fn test_completing_first_lesson_unlocks_everything() {
    let app = create_test_app();
    seed_lessons(&app.store, 5);
    let token = token_for("learner");

    let response = app
        .send(request("POST", "/api/lessons/lesson-3/start", Some(&token), None))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "LESSON_LOCKED");

    let response = app
        .send(request("POST", "/api/lessons/lesson-0/start", Some(&token), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "in_progress");

    let response = app
        .send(request(
            "PUT",
            "/api/lessons/lesson-0/progress",
            Some(&token),
            Some(serde_json::json!({ "progressPercentage": 100 })),
        ))
        .await;
    let done = body_json(response).await;
    assert_eq!(done["data"]["status"], "completed");
    assert!(done["data"]["completed_at"].is_string());

    let list = body_json(app.send(request("GET", "/api/lessons", Some(&token), None)).await).await;
    assert!(states(&list).iter().all(|s| s == "unlocked"));

    let response = app
        .send(request("POST", "/api/lessons/lesson-3/start", Some(&token), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_progress_before_start_is_conflict() {
    let app = create_test_app();
    seed_lessons(&app.store, 1);

    let response = app
        .send(request(
            "PUT",
            "/api/lessons/lesson-0/progress",
            Some(&token_for("learner")),
            Some(serde_json::json!({ "progressPercentage": 30 })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "LESSON_NOT_STARTED");
}

#[tokio::test]
async fn test_reset_twice_is_same_as_once() {
    let app = create_test_app();
    seed_lessons(&app.store, 1);
    let token = token_for("learner");

    app.send(request("POST", "/api/lessons/lesson-0/start", Some(&token), None))
        .await;
    app.send(request(
        "PUT",
        "/api/lessons/lesson-0/progress",
        Some(&token),
        Some(serde_json::json!({ "progressPercentage": 60 })),
    ))
    .await;

    let first = body_json(app.send(request("POST", "/api/lessons/lesson-0/reset", Some(&token), None)).await).await;
    let second = body_json(app.send(request("POST", "/api/lessons/lesson-0/reset", Some(&token), None)).await).await;

    for reset in [&first, &second] {
        assert_eq!(reset["data"]["status"], "not_started");
        assert_eq!(reset["data"]["progress_percentage"], 0);
        assert!(reset["data"]["started_at"].is_null());
        assert!(reset["data"]["completed_at"].is_null());
    }
}

#[tokio::test]
async fn test_unknown_lesson_is_404() {
    let app = create_test_app();
    seed_lessons(&app.store, 1);

    let response = app
        .send(request("POST", "/api/lessons/missing/start", Some(&token_for("learner")), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
