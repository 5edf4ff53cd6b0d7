#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use apex_agent::config::ContextLimits;
use apex_agent::file_source::LocalFileSource;
use apex_agent::generator::PatchGenerator;
use apex_agent::llm::ChatProvider;
use apex_agent::sink::{LocalFilesystemSink, LocalSinkOptions};
use apex_agent::store::PgPatchStore;
use apex_agent::{AgentError, PatchService};
use apex_api::auth::jwt::{sign_token, JwtConfig};
use apex_api::config::ServerConfig;
use apex_api::router::build_app_router;
use apex_api::state::AppState;
use apex_core::roles::{ROLE_MEMBER, ROLE_OWNER};
use apex_core::types::DbId;

pub const OWNER_ID: DbId = 1;
pub const OTHER_USER_ID: DbId = 2;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        owner_user_id: OWNER_ID,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
            issuer: None,
        },
    }
}

pub fn owner_token() -> String {
    sign_token(OWNER_ID, ROLE_OWNER, &test_config().jwt).unwrap()
}

pub fn member_token() -> String {
    sign_token(OTHER_USER_ID, ROLE_MEMBER, &test_config().jwt).unwrap()
}

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

/// Returns canned responses in order.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete_json(&self, _system: &str, _user: &str) -> Result<String, AgentError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Llm("no scripted response left".into()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A minimal Next.js project tree.
pub fn seed_project(root: &Path) {
    let files = [
        ("package.json", r#"{"name":"apex-agents","dependencies":{"next":"14.2.0","react":"18.3.0"}}"#),
        ("src/app/layout.tsx", "export default function RootLayout({ children }) { return children; }"),
        ("src/app/globals.css", ":root { --bg: #fff; }"),
        ("src/app/page.tsx", "export default function Home() { return null; }"),
    ];
    for (rel, content) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// A valid patch creating one component and restyling the globals.
pub fn dark_mode_patch() -> String {
    serde_json::json!({
        "summary": "Add dark mode",
        "files": [
            {
                "path": "src/app/globals.css",
                "action": "modify",
                "content": ":root { --bg: #fff; }\n.dark { --bg: #000; }",
                "explanation": "dark palette"
            },
            {
                "path": "src/components/theme-toggle.tsx",
                "action": "create",
                "content": "export function ThemeToggle() { return null; }",
                "explanation": "toggle"
            }
        ],
        "testingSteps": ["Toggle the theme"],
        "risks": []
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build the full application router against `pool`, a project tree at
/// `root`, and a model that answers with `responses` in order.
pub fn build_test_app(pool: PgPool, root: &Path, responses: Vec<String>) -> Router {
    let config = test_config();

    let provider = Arc::new(ScriptedProvider {
        responses: Mutex::new(responses.into()),
    });
    let source = Arc::new(LocalFileSource::new(root));
    let generator = PatchGenerator::new(provider, source, "apex-agents", ContextLimits::default());
    let sink = Arc::new(LocalFilesystemSink::new(root, LocalSinkOptions::default()));
    let store = Arc::new(PgPatchStore::new(pool.clone()));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        patches: Arc::new(PatchService::new(generator, sink, store)),
    };

    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
