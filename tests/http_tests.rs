//! Route-level tests: the full router served on an ephemeral localhost port,
//! driven with a real HTTP client. Covers the envelope shapes and the
//! auth/CSRF/role gates that only exist at this layer.

use std::fs;
use std::net::SocketAddr;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

use alcove::config::Config;
use alcove::server::{self, AppState};
use alcove::store::Store;

const PASSWORD: &str = "Sup3rSecret";

struct TestApp {
    base: String,
    client: reqwest::Client,
    store: Store,
    _tmp: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Credentials for one logged-in caller: the session cookie pair as sent in
/// the `Cookie` header, and the CSRF token bound to that session.
struct Login {
    user_id: i64,
    cookie: String,
    csrf: String,
}

// Serves the router over a one-file media tree. The listener is bound before
// the serve task is spawned, so requests can connect immediately; the task
// stops when the test runtime shuts down.
async fn spawn_app() -> Result<TestApp> {
    let tmp = tempdir()?;
    let media = tmp.path().join("media");
    fs::create_dir_all(&media)?;
    fs::write(media.join("track.mp3"), b"aaaa")?;

    let store = Store::open_in_memory().await?;
    let config = Config::for_paths(&media, tmp.path().join("alcove.db"));
    let app = server::router(AppState::new(store.clone(), &config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    Ok(TestApp {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        store,
        _tmp: tmp,
    })
}

async fn register_and_login(app: &TestApp, email: &str, username: &str) -> Result<Login> {
    let resp = app
        .client
        .post(app.url("/register"))
        .json(&json!({ "email": email, "username": username, "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200, "registration accepted");

    let resp = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "identifier": username, "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200, "login accepted");
    let cookie = resp
        .headers()
        .get("set-cookie")
        .expect("login sets the session cookie")
        .to_str()?
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string();
    let body: Value = resp.json().await?;
    let user_id = body["user"]["id"].as_i64().expect("user id in login body");

    let resp = app
        .client
        .get(app.url("/csrf"))
        .header("cookie", &cookie)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    let csrf = body["csrf"].as_str().expect("csrf token").to_string();

    Ok(Login { user_id, cookie, csrf })
}

/// Browses the root anonymously and returns the id of the seeded track.
async fn seeded_file_id(app: &TestApp) -> Result<i64> {
    let resp = app.client.get(app.url("/")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    let id = body["files"][0]["file"]["id"]
        .as_i64()
        .expect("the seeded track is listed");
    Ok(id)
}

#[tokio::test]
async fn login_reports_the_failing_field_and_sets_a_hardened_cookie() -> Result<()> {
    let app = spawn_app().await?;
    let resp = app
        .client
        .post(app.url("/register"))
        .json(&json!({ "email": "alice@example.com", "username": "alice", "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    // Wrong password and unknown identifier share one message; only the
    // field hint differs
    let resp = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "identifier": "alice", "password": "wrong-password" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "invalid credentials");
    assert_eq!(body["field"], "password");

    let resp = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "identifier": "nobody", "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "invalid credentials");
    assert_eq!(body["field"], "identifier");

    let resp = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "identifier": "alice", "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .expect("session cookie issued")
        .to_str()?
        .to_string();
    assert!(cookie.starts_with("alcove_session="), "unexpected cookie: {cookie}");
    for attr in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/"] {
        assert!(cookie.contains(attr), "cookie missing {attr}: {cookie}");
    }
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"]["password_hash"].is_null(), "hashes never leave the server");
    Ok(())
}

#[tokio::test]
async fn anonymous_mutations_are_rejected() -> Result<()> {
    let app = spawn_app().await?;
    let file = seeded_file_id(&app).await?;

    let attempts = vec![
        (format!("/file/{file}/like"), json!({})),
        (format!("/file/{file}/rating"), json!({ "rating": 4 })),
        (format!("/file/{file}/comments"), json!({ "comment": "hi" })),
        (format!("/file/{file}/metadata"), json!({ "title": "Renamed" })),
        ("/comments/1/delete".to_string(), json!({})),
        (
            "/change-password".to_string(),
            json!({ "current_password": "a", "new_password": "b", "confirm_password": "b" }),
        ),
    ];
    for (path, payload) in attempts {
        let resp = app.client.post(app.url(&path)).json(&payload).send().await?;
        assert_eq!(resp.status().as_u16(), 401, "{path} allowed an anonymous write");
        let body: Value = resp.json().await?;
        assert_eq!(body["code"], "not_authenticated", "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn state_changing_posts_require_the_csrf_token() -> Result<()> {
    let app = spawn_app().await?;
    let file = seeded_file_id(&app).await?;
    let login = register_and_login(&app, "alice@example.com", "alice").await?;

    // The session cookie alone is not enough
    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/like")))
        .header("cookie", &login.cookie)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 403);
    let body: Value = resp.json().await?;
    assert_eq!(body["code"], "csrf_invalid");

    // Neither is a token that does not match the session
    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/like")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", "forged")
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 403);

    // The paired token passes and the like lands
    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/like")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    assert_eq!(body["like"], "liked");

    // The browse envelope now decorates the file for this viewer
    let resp = app
        .client
        .get(app.url("/"))
        .header("cookie", &login.cookie)
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["files"][0]["liked"], true);
    assert_eq!(body["files"][0]["rating"]["count"], 0);

    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/like")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    assert_eq!(body["like"], "unliked");
    Ok(())
}

#[tokio::test]
async fn engagement_writes_require_an_existing_file() -> Result<()> {
    let app = spawn_app().await?;
    let login = register_and_login(&app, "alice@example.com", "alice").await?;

    let attempts = vec![
        ("/file/999999/like".to_string(), json!({})),
        ("/file/999999/rating".to_string(), json!({ "rating": 5 })),
        ("/file/999999/comments".to_string(), json!({ "comment": "ghost" })),
    ];
    for (path, payload) in attempts {
        let resp = app
            .client
            .post(app.url(&path))
            .header("cookie", &login.cookie)
            .header("x-csrf-token", &login.csrf)
            .json(&payload)
            .send()
            .await?;
        assert_eq!(resp.status().as_u16(), 404, "{path} wrote to a missing file");
        let body: Value = resp.json().await?;
        assert_eq!(body["code"], "file_missing", "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn metadata_and_moderation_need_an_editor_role() -> Result<()> {
    let app = spawn_app().await?;
    let file = seeded_file_id(&app).await?;
    let login = register_and_login(&app, "mona@example.com", "mona").await?;

    // Commenting is open to any authenticated user
    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/comments")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .json(&json!({ "comment": "lovely track" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    let comment_id = body["comment"]["id"].as_i64().expect("comment id");

    // Editing metadata and deleting comments are not
    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/metadata")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .json(&json!({ "title": "Renamed" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 403);
    let resp = app
        .client
        .post(app.url(&format!("/comments/{comment_id}/delete")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 403);

    // Roles are read per request, so a fresh grant takes effect immediately
    app.store.grant_role(login.user_id, "Editor").await?;

    let resp = app
        .client
        .post(app.url(&format!("/file/{file}/metadata")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .json(&json!({ "title": "Renamed" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app.client.get(app.url(&format!("/file/{file}"))).send().await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["file"]["title"], "Renamed");
    assert_eq!(body["comments"][0]["content"], "lovely track");

    let resp = app
        .client
        .post(app.url(&format!("/comments/{comment_id}/delete")))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let resp = app.client.get(app.url(&format!("/file/{file}"))).send().await?;
    let body: Value = resp.json().await?;
    assert!(body["comments"].as_array().expect("comments array").is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session() -> Result<()> {
    let app = spawn_app().await?;
    let login = register_and_login(&app, "alice@example.com", "alice").await?;

    let resp = app
        .client
        .get(app.url("/profile"))
        .header("cookie", &login.cookie)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app
        .client
        .post(app.url("/logout"))
        .header("cookie", &login.cookie)
        .header("x-csrf-token", &login.csrf)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let cleared = resp
        .headers()
        .get("set-cookie")
        .expect("logout clears the cookie")
        .to_str()?
        .to_string();
    assert!(cleared.contains("Expires=Thu, 01 Jan 1970"), "not expired: {cleared}");

    let resp = app
        .client
        .get(app.url("/profile"))
        .header("cookie", &login.cookie)
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    Ok(())
}
