use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_cms::MockCms;
use serde_json::{json, Value};
use tower::ServiceExt;

const CLIENT_ID: &str = "test-client";
const CLIENT_SECRET: &str = "test-secret";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn token_request(client_id: &str, client_secret: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/api/authorize/access_token")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=client_credentials&client_id={client_id}&client_secret={client_secret}"
        ))
        .unwrap()
}

async fn token(cms: &MockCms) -> String {
    let resp = cms
        .router()
        .oneshot(token_request(CLIENT_ID, CLIENT_SECRET))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

fn authed(method: &str, uri: &str, token: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

async fn call(cms: &MockCms, request: Request<String>) -> axum::response::Response {
    cms.router().oneshot(request).await.unwrap()
}

// --- token ---

#[tokio::test]
async fn token_endpoint_issues_bearer_token() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let resp = call(&cms, token_request(CLIENT_ID, CLIENT_SECRET)).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().unwrap().starts_with("mock-"));
    assert_eq!(cms.token_requests(), 1);
}

#[tokio::test]
async fn wrong_secret_is_invalid_client() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let resp = call(&cms, token_request(CLIENT_ID, "nope")).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "invalid_client");
    assert_eq!(body["error_description"], "Client authentication failed");
}

#[tokio::test]
async fn api_requires_issued_token() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let resp = call(&cms, authed("GET", "/api/about", "forged", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let token = token(&cms).await;
    let resp = call(&cms, authed("GET", "/api/about", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["version"], "4.0.0");
    assert_eq!(cms.api_requests(), 1);
}

// --- list ---

#[tokio::test]
async fn list_pages_with_start_and_length() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    for i in 0..25 {
        cms.seed("tag", json!({ "tag": format!("tag-{i}") }));
    }
    let token = token(&cms).await;

    let resp = call(&cms, authed("GET", "/api/tag", &token, "")).await;
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 10);

    let resp = call(&cms, authed("GET", "/api/tag?start=20&length=10", &token, "")).await;
    let page = body_json(resp).await;
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 5);
    assert_eq!(page[0]["tagId"], 21);
}

#[tokio::test]
async fn list_applies_filters() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    cms.seed("display", json!({"display": "Lobby east", "authorised": true}));
    cms.seed("display", json!({"display": "Lobby west", "authorised": false}));
    cms.seed("display", json!({"display": "Car park", "authorised": true}));
    let token = token(&cms).await;

    let resp = call(
        &cms,
        authed("GET", "/api/display?display=Lobby&authorised=1&length=100", &token, ""),
    )
    .await;
    let displays = body_json(resp).await;
    assert_eq!(displays, json!([{"display": "Lobby east", "authorised": true, "displayId": 1}]));
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let token = token(&cms).await;
    let resp = call(&cms, authed("GET", "/api/widgets", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- entities ---

#[tokio::test]
async fn crud_lifecycle() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let token = token(&cms).await;

    let resp = call(&cms, authed("POST", "/api/campaign", &token, r#"{"name":"Spring"}"#)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created, json!({"name": "Spring", "campaignId": 1}));

    let resp = call(
        &cms,
        authed("PUT", "/api/campaign/1", &token, r#"{"name":"Summer","campaignId":99}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"name": "Summer", "campaignId": 1}));

    let resp = call(&cms, authed("GET", "/api/campaign/1", &token, "")).await;
    assert_eq!(body_json(resp).await["name"], "Summer");

    let resp = call(&cms, authed("DELETE", "/api/campaign/1", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = call(&cms, authed("GET", "/api/campaign/1", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(cms.count("campaign"), 0);
}

#[tokio::test]
async fn update_without_body_keeps_entity() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let id = cms.seed("playlist", json!({"name": "Loop"}));
    let token = token(&cms).await;

    let resp = call(&cms, authed("PUT", &format!("/api/playlist/{id}"), &token, "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"name": "Loop", "playlistId": id}));
}

// --- actions ---

#[tokio::test]
async fn authorise_toggles_and_records() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let id = cms.seed("display", json!({"display": "Lobby", "authorised": false}));
    let token = token(&cms).await;

    let resp = call(&cms, authed("PUT", &format!("/api/display/authorise/{id}"), &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(cms.entity("display", id).unwrap()["authorised"], true);

    let actions = cms.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, "authorise");
    assert_eq!(actions[0].id, id);
}

#[tokio::test]
async fn action_on_missing_entity_is_not_found() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let token = token(&cms).await;
    let resp = call(&cms, authed("POST", "/api/display/wol/42", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(cms.actions().is_empty());
}

#[tokio::test]
async fn nested_actions_record_bodies() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let group = cms.seed("displaygroup", json!({"displayGroup": "Foyer"}));
    let campaign = cms.seed("campaign", json!({"campaign": "Spring"}));
    let token = token(&cms).await;

    let resp = call(
        &cms,
        authed(
            "POST",
            &format!("/api/displaygroup/{group}/action/changeLayout"),
            &token,
            r#"{"layoutId":5,"duration":0}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(
        &cms,
        authed(
            "POST",
            &format!("/api/campaign/layout/assign/{campaign}"),
            &token,
            r#"{"layoutId":["1","2"]}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let actions = cms.actions();
    assert_eq!(actions[0].resource, "displaygroup");
    assert_eq!(actions[0].action, "changeLayout");
    assert_eq!(actions[0].body["layoutId"], 5);
    assert_eq!(actions[1].action, "assignLayout");
    assert_eq!(actions[1].body["layoutId"], json!(["1", "2"]));
}

#[tokio::test]
async fn layout_copy_creates_new_layout() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let id = cms.seed("layout", json!({"layout": "Lobby"}));
    let token = token(&cms).await;

    let resp = call(
        &cms,
        authed("POST", &format!("/api/layout/copy/{id}"), &token, r#"{"name":"Lobby 2"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await, json!({"layout": "Lobby 2", "layoutId": 2}));
    assert_eq!(cms.count("layout"), 2);
}

#[tokio::test]
async fn dataset_data_returns_rows() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let id = cms.seed("dataset", json!({"dataSet": "Menu", "rows": [{"item": "Tea"}]}));
    let token = token(&cms).await;

    let resp = call(&cms, authed("GET", &format!("/api/dataset/data/{id}"), &token, "")).await;
    assert_eq!(body_json(resp).await, json!([{"item": "Tea"}]));
}

// --- upload ---

#[tokio::test]
async fn multipart_upload_creates_media() {
    let cms = MockCms::new(CLIENT_ID, CLIENT_SECRET);
    let token = token(&cms).await;

    let body = "--XYZ\r\n\
                Content-Disposition: form-data; name=\"files\"; filename=\"logo.png\"\r\n\
                Content-Type: image/png\r\n\r\n\
                PNGDATA\r\n\
                --XYZ\r\n\
                Content-Disposition: form-data; name=\"tags\"\r\n\r\n\
                lobby\r\n\
                --XYZ--\r\n";
    let request = Request::builder()
        .method("POST")
        .uri("/api/library")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
        .body(body.to_string())
        .unwrap();
    let resp = call(&cms, request).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let media = &body["files"][0];
    assert_eq!(media["mediaId"], 1);
    assert_eq!(media["name"], "logo.png");
    assert_eq!(media["mediaType"], "image");
    assert_eq!(media["fileSize"], 7);
    assert_eq!(media["tags"], "lobby");
    assert_eq!(cms.count("library"), 1);
}
