use serde_json::{json, Value};
use std::path::PathBuf;
use socialenz_backend::api::{self, AppState};
use socialenz_backend::bootstrap;
use socialenz_backend::config::{AuthConfig, SocialenzConfig, SocialenzPaths};
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

struct TestServer {
    _dir: TempDir,
    media_dir: PathBuf,
    server: tokio::task::JoinHandle<()>,
    base_url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempdir().expect("tempdir");
        let paths = SocialenzPaths::from_base_dir(dir.path()).expect("paths");
        let mut auth = AuthConfig::with_secret("integration-secret");
        auth.bcrypt_cost = 4;
        let media_dir = paths.media_dir.clone();
        let config = SocialenzConfig::new(0, paths, auth);

        let resources = bootstrap::initialize(&config).await.expect("bootstrap");
        let state = AppState::new(config, resources.database).expect("state");
        let router = api::build_router(state).expect("router");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service()).await;
        });

        Self {
            _dir: dir,
            media_dir,
            server,
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, username: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/user/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "secret-pass",
                "phoneNumber": "5550100",
            }))
            .send()
            .await
            .expect("register response");
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.expect("register json");
        body["user"]["id"].as_str().expect("user id").to_string()
    }

    async fn login(&self, username: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/user/login"))
            .json(&json!({ "username": username, "password": "secret-pass" }))
            .send()
            .await
            .expect("login response");
        assert_eq!(resp.status(), 200);
        let cookie = resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("session cookie")
            .to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));
        let body: Value = resp.json().await.expect("login json");
        body["token"].as_str().expect("token").to_string()
    }

    fn stored_media(&self) -> Vec<String> {
        match std::fs::read_dir(&self.media_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn shutdown(self) {
        self.server.abort();
        let _ = self.server.await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn social_roundtrip_posts_likes_and_messages() {
    let server = TestServer::start().await;
    let client = &server.client;

    let alice_id = server.register("alice").await;
    let bob_id = server.register("bob").await;
    let alice = server.login("alice").await;
    let bob = server.login("bob").await;

    let form = reqwest::multipart::Form::new()
        .text("caption", "hello")
        .part(
            "images",
            reqwest::multipart::Part::bytes(PNG_BYTES.to_vec())
                .file_name("pic.png")
                .mime_str("image/png")
                .unwrap(),
        );
    let resp = client
        .post(server.url("/api/v1/post/createPost"))
        .bearer_auth(&alice)
        .multipart(form)
        .send()
        .await
        .expect("create post");
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.expect("post json");
    let post_id = created["post"]["id"].as_str().expect("post id").to_string();
    let image_url = created["post"]["images"][0].as_str().expect("image url").to_string();
    assert_eq!(created["post"]["caption"], "hello");

    let image = client
        .get(server.url(&image_url))
        .send()
        .await
        .expect("image download");
    assert_eq!(image.status(), 200);
    assert_eq!(image.bytes().await.expect("image bytes").as_ref(), PNG_BYTES);

    let profile: Value = client
        .get(server.url(&format!("/api/v1/user/profile/{alice_id}")))
        .send()
        .await
        .expect("profile")
        .json()
        .await
        .expect("profile json");
    assert_eq!(profile["posts"][0]["id"], post_id.as_str());

    let like_url = server.url(&format!("/api/v1/post/posts/{post_id}/like"));
    let liked: Value = client
        .put(&like_url)
        .bearer_auth(&bob)
        .send()
        .await
        .expect("like")
        .json()
        .await
        .expect("like json");
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["likesCount"], 1);

    let unliked: Value = client
        .put(&like_url)
        .bearer_auth(&bob)
        .send()
        .await
        .expect("unlike")
        .json()
        .await
        .expect("unlike json");
    assert_eq!(unliked["liked"], false);
    assert_eq!(unliked["likesCount"], 0);

    let notifications: Value = client
        .get(server.url("/api/v1/notification"))
        .bearer_auth(&alice)
        .send()
        .await
        .expect("notifications")
        .json()
        .await
        .expect("notifications json");
    assert_eq!(notifications["notifications"][0]["type"], "like");

    let sent = client
        .post(server.url(&format!("/api/v1/message/send/{bob_id}")))
        .bearer_auth(&alice)
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .expect("send message");
    assert_eq!(sent.status(), 200);

    let conversations: Value = client
        .get(server.url("/api/v1/message/conversations"))
        .bearer_auth(&bob)
        .send()
        .await
        .expect("conversations")
        .json()
        .await
        .expect("conversations json");
    let list = conversations["conversations"].as_array().expect("array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["unreadCount"], 1);
    assert_eq!(list[0]["participant"]["id"], alice_id.as_str());
    assert_eq!(list[0]["lastMessage"]["content"], "hi");

    let messages: Value = client
        .get(server.url(&format!("/api/v1/message/all/{alice_id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .expect("messages")
        .json()
        .await
        .expect("messages json");
    assert_eq!(messages["messages"].as_array().map(Vec::len), Some(1));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejections_use_expected_statuses() {
    let server = TestServer::start().await;
    let client = &server.client;

    let unauthenticated = client
        .get(server.url("/api/v1/post/AllPost"))
        .send()
        .await
        .expect("all posts");
    assert_eq!(unauthenticated.status(), 401);

    let forged = client
        .get(server.url("/api/v1/post/AllPost"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("all posts forged");
    assert_eq!(forged.status(), 401);

    let missing = client
        .get(server.url("/api/v1/does-not-exist"))
        .send()
        .await
        .expect("missing route");
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.expect("missing json");
    assert_eq!(body["message"], "Route not found");

    let malformed = client
        .post(server.url("/api/v1/user/register"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .expect("malformed register");
    assert_eq!(malformed.status(), 422);

    server.register("carol").await;
    let duplicate = client
        .post(server.url("/api/v1/user/register"))
        .json(&json!({
            "username": "carol",
            "email": "other@example.com",
            "password": "secret-pass",
            "phoneNumber": "5550101",
        }))
        .send()
        .await
        .expect("duplicate register");
    assert_eq!(duplicate.status(), 409);

    let bad_password = client
        .post(server.url("/api/v1/user/login"))
        .json(&json!({ "username": "carol", "password": "wrong-pass" }))
        .send()
        .await
        .expect("bad login");
    assert_eq!(bad_password.status(), 401);

    server.shutdown().await;
}

fn png_part(name: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(PNG_BYTES.to_vec())
        .file_name(name.to_string())
        .mime_str("image/png")
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_multipart_requests_leave_no_media_behind() {
    let server = TestServer::start().await;
    let client = &server.client;

    let alice_id = server.register("alice").await;
    let bob_id = server.register("bob").await;
    let alice = server.login("alice").await;

    let form = reqwest::multipart::Form::new()
        .part(
            "media",
            reqwest::multipart::Part::bytes(b"attachment body".to_vec()).file_name("note.txt"),
        )
        .text("type", "bogus");
    let resp = client
        .post(server.url(&format!("/api/v1/message/send/{bob_id}")))
        .bearer_auth(&alice)
        .multipart(form)
        .send()
        .await
        .expect("send message form");
    assert_eq!(resp.status(), 400);
    assert!(server.stored_media().is_empty());

    let form = reqwest::multipart::Form::new()
        .part("profilePicture", png_part("me.png"))
        .text("gender", "bogus");
    let resp = client
        .put(server.url(&format!("/api/v1/user/edit-profile/{alice_id}")))
        .bearer_auth(&alice)
        .multipart(form)
        .send()
        .await
        .expect("edit profile form");
    assert_eq!(resp.status(), 400);
    assert!(server.stored_media().is_empty());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replacing_profile_picture_removes_the_old_file() {
    let server = TestServer::start().await;
    let client = &server.client;

    let alice_id = server.register("alice").await;
    let alice = server.login("alice").await;
    let edit_url = server.url(&format!("/api/v1/user/edit-profile/{alice_id}"));

    let mut pictures = Vec::new();
    for name in ["first.png", "second.png"] {
        let form = reqwest::multipart::Form::new().part("profilePicture", png_part(name));
        let profile: Value = client
            .put(&edit_url)
            .bearer_auth(&alice)
            .multipart(form)
            .send()
            .await
            .expect("edit profile")
            .json()
            .await
            .expect("profile json");
        pictures.push(profile["profilePicture"].as_str().expect("picture").to_string());
    }

    let stored = server.stored_media();
    assert_eq!(stored.len(), 1);
    assert!(pictures[1].ends_with(&stored[0]));

    let old = client
        .get(server.url(&pictures[0]))
        .send()
        .await
        .expect("old picture");
    assert_eq!(old.status(), 404);

    server.shutdown().await;
}
