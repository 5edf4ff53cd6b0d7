use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::sync::Arc;

use apex_agent::config::GithubConfig;
use apex_agent::github::{CommitChange, GithubClient};
use apex_agent::sink::{PatchSink, RemoteCommitSink};
use apex_agent::AgentError;
use apex_core::patch::{FileChange, PatchData, PatchRecord, PatchStatus};

const TOKEN: &str = "ghp_testtoken0123456789";

fn client(server: &MockServer) -> GithubClient {
    GithubClient::new(GithubConfig {
        token: TOKEN.to_string(),
        api_url: server.uri(),
        owner: "acme".to_string(),
        repo: "apex".to_string(),
        branch: "main".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn tree_listing_is_cached_per_repo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/apex/git/trees/main"))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "t1",
            "truncated": false,
            "tree": [
                { "path": "src", "type": "tree" },
                { "path": "src/app/page.tsx", "type": "blob" },
                { "path": "package.json", "type": "blob" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let github = client(&server);
    let first = github.list_files().await.unwrap();
    let second = github.list_files().await.unwrap();
    assert_eq!(first, vec!["src/app/page.tsx", "package.json"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn reads_raw_file_content_on_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/apex/contents/src/app/page.tsx"))
        .and(query_param("ref", "main"))
        .and(header("accept", "application/vnd.github.raw+json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("export default function Page() {}"))
        .mount(&server)
        .await;

    let content = client(&server).read_file("src/app/page.tsx").await.unwrap();
    assert_eq!(content, "export default function Page() {}");
}

#[tokio::test]
async fn missing_file_is_source_control_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/apex/contents/nope.ts"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let result = client(&server).read_file("nope.ts").await;
    assert_matches!(result, Err(AgentError::SourceControl(msg)) if msg.contains("404"));
}

async fn mount_commit_flow(server: &MockServer, ref_status: u16) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/apex/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/main",
            "object": { "sha": "parent-sha", "type": "commit" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/apex/git/commits/parent-sha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "parent-sha",
            "tree": { "sha": "base-tree" }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/apex/git/trees"))
        .and(body_partial_json(json!({
            "base_tree": "base-tree",
            "tree": [
                { "path": "src/theme.ts", "mode": "100644", "type": "blob", "content": "dark" },
                { "path": "src/old.ts", "mode": "100644", "type": "blob", "sha": null }
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "new-tree" })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/apex/git/commits"))
        .and(body_partial_json(json!({ "tree": "new-tree", "parents": ["parent-sha"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "new-commit" })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/acme/apex/git/refs/heads/main"))
        .and(body_partial_json(json!({ "sha": "new-commit", "force": false })))
        .respond_with(ResponseTemplate::new(ref_status).set_body_json(json!({})))
        .expect(1)
        .mount(server)
        .await;
}

fn changes() -> Vec<CommitChange> {
    vec![
        CommitChange {
            path: "src/theme.ts".into(),
            content: Some("dark".into()),
        },
        CommitChange {
            path: "src/old.ts".into(),
            content: None,
        },
    ]
}

#[tokio::test]
async fn commit_runs_git_data_flow_and_returns_sha() {
    let server = MockServer::start().await;
    mount_commit_flow(&server, 200).await;

    let sha = client(&server).commit_changes(&changes(), "Add dark mode").await.unwrap();
    assert_eq!(sha, "new-commit");
}

#[tokio::test]
async fn rejected_ref_update_propagates() {
    let server = MockServer::start().await;
    mount_commit_flow(&server, 422).await;

    let err = client(&server)
        .commit_changes(&changes(), "Add dark mode")
        .await
        .unwrap_err();
    assert_matches!(&err, AgentError::SourceControl(msg) if msg.contains("update branch ref"));
    assert!(!err.to_string().contains(TOKEN));
}

// ---------------------------------------------------------------------------
// RemoteCommitSink
// ---------------------------------------------------------------------------

fn dark_mode_record(files: Vec<FileChange>) -> PatchRecord {
    PatchRecord::new(
        "patch_1700000000000",
        "add dark mode",
        PatchData {
            files,
            summary: Some("Add dark mode".into()),
            description: None,
            testing_steps: vec!["Toggle the theme".into()],
            risks: vec![],
            database_changes: None,
        },
        Some(1),
    )
}

fn theme_and_cleanup() -> Vec<FileChange> {
    vec![
        FileChange::Create {
            path: "./src/theme.ts".into(),
            content: "dark".into(),
            explanation: Some("palette".into()),
        },
        FileChange::Delete {
            path: "src/old.ts".into(),
            explanation: Some("unused".into()),
        },
    ]
}

#[tokio::test]
async fn remote_sink_marks_record_applied_with_commit_sha() {
    let server = MockServer::start().await;
    mount_commit_flow(&server, 200).await;

    let sink = RemoteCommitSink::new(Arc::new(client(&server)));
    let mut record = dark_mode_record(theme_and_cleanup());

    assert!(sink.apply_patch(&mut record).await.unwrap());
    assert_eq!(record.status, PatchStatus::Applied);
    assert_eq!(record.commit_sha.as_deref(), Some("new-commit"));
    assert!(record.error.is_none());
    assert_eq!(sink.kind(), "remote");
}

#[tokio::test]
async fn remote_sink_records_failed_ref_update() {
    let server = MockServer::start().await;
    mount_commit_flow(&server, 422).await;

    let sink = RemoteCommitSink::new(Arc::new(client(&server)));
    let mut record = dark_mode_record(theme_and_cleanup());

    let result = sink.apply_patch(&mut record).await;
    assert_matches!(result, Err(AgentError::SourceControl(_)));
    assert_eq!(record.status, PatchStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("update branch ref"));
    assert!(record.commit_sha.is_none());
}

#[tokio::test]
async fn remote_sink_rejects_invalid_patch_without_calling_github() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let sink = RemoteCommitSink::new(Arc::new(client(&server)));
    let mut record = dark_mode_record(vec![]);

    assert_matches!(sink.apply_patch(&mut record).await, Err(AgentError::InvalidPatch(_)));
    assert_eq!(record.status, PatchStatus::Failed);
    assert!(record.commit_sha.is_none());
}

#[tokio::test]
async fn remote_rollback_is_unsupported() {
    let server = MockServer::start().await;
    let sink = RemoteCommitSink::new(Arc::new(client(&server)));
    let mut record = dark_mode_record(theme_and_cleanup());
    record.transition(PatchStatus::Applied, None);

    assert!(!sink.rollback_patch(&mut record).await.unwrap());
    assert_eq!(record.status, PatchStatus::Applied);
}
