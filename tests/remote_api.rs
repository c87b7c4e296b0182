//! 使用 axum 实现的内存版好友服务，驱动真实的 reqwest 客户端与同步器

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use friends_radar_sync::radar::db::create_sqlite_pool_with_migration;
use friends_radar_sync::radar::friend::api::{FriendApi, HttpConnector, RemoteFriends};
use friends_radar_sync::radar::friend::dao::{FriendDao, DEFAULT_BASE_KEY};
use friends_radar_sync::radar::friend::models::{Friend, FriendSyncerConfig, SyncPhase};
use friends_radar_sync::radar::friend::service::FriendSyncer;
use friends_radar_sync::radar::types::{BatchUpsertReq, UpsertFriendReq};
use friends_radar_sync::radar::{Connectivity, SyncError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,friends_radar_sync=debug,hyper_util=info,reqwest=info");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

/// 服务端状态：用户 -> 好友列表
#[derive(Default)]
struct Stub {
    store: Mutex<HashMap<String, Vec<Friend>>>,
    hits: AtomicUsize,
}

impl Stub {
    fn friends_of(&self, user: &str) -> Vec<Friend> {
        self.store
            .lock()
            .unwrap()
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    fn seed(&self, user: &str, friends: Vec<Friend>) {
        self.store.lock().unwrap().insert(user.to_string(), friends);
    }

    fn upsert(&self, user: &str, friend: Friend) {
        let mut store = self.store.lock().unwrap();
        let list = store.entry(user.to_string()).or_default();
        match list.iter_mut().find(|f| f.id == friend.id) {
            Some(existing) => *existing = friend,
            None => list.push(friend),
        }
    }
}

type Reply = (StatusCode, Json<Value>);

/// 开发模式的鉴权：token 即用户 ID，`bad` 视为无效 token
fn authorize(stub: &Stub, headers: &HeaderMap) -> Result<String, Reply> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty() && *t != "bad");
    match token {
        Some(user) => Ok(user.to_string()),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )),
    }
}

fn success() -> Reply {
    (StatusCode::OK, Json(json!({ "success": true })))
}

async fn list_friends(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Reply {
    let user = match authorize(&stub, &headers) {
        Ok(user) => user,
        Err(reply) => return reply,
    };
    let mut friends = stub.friends_of(&user);
    friends.sort_by(|a, b| a.name.cmp(&b.name));
    (StatusCode::OK, Json(json!({ "friends": friends })))
}

async fn upsert_friend(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpsertFriendReq>,
) -> Reply {
    let user = match authorize(&stub, &headers) {
        Ok(user) => user,
        Err(reply) => return reply,
    };
    stub.upsert(
        &user,
        Friend {
            id,
            name: body.name,
            last_contact: body.last_contact,
        },
    );
    success()
}

async fn delete_friend(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    let user = match authorize(&stub, &headers) {
        Ok(user) => user,
        Err(reply) => return reply,
    };
    if let Some(list) = stub.store.lock().unwrap().get_mut(&user) {
        list.retain(|f| f.id != id);
    }
    success()
}

async fn batch_upsert(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<BatchUpsertReq>,
) -> Reply {
    let user = match authorize(&stub, &headers) {
        Ok(user) => user,
        Err(reply) => return reply,
    };
    for friend in body.friends {
        stub.upsert(&user, friend);
    }
    success()
}

async fn spawn_stub() -> (String, Arc<Stub>) {
    init_test_logger();
    let stub = Arc::new(Stub::default());
    let app = Router::new()
        .route("/api/friends", get(list_friends))
        .route("/api/friends/batch", put(batch_upsert))
        .route("/api/friends/:id", put(upsert_friend).delete(delete_friend))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), stub)
}

fn api(base: &str, scope: &str, token: Option<&str>) -> FriendApi {
    FriendApi::new(
        reqwest::Client::new(),
        base,
        Some(scope.to_string()),
        token.map(str::to_string),
        Connectivity::default(),
    )
}

fn friend(id: &str, name: &str, last_contact: i64) -> Friend {
    Friend {
        id: id.to_string(),
        name: name.to_string(),
        last_contact,
    }
}

async fn syncer_against(base: &str) -> (FriendSyncer, FriendDao) {
    let pool = create_sqlite_pool_with_migration("sqlite::memory:")
        .await
        .unwrap();
    let dao = FriendDao::new(pool, DEFAULT_BASE_KEY);
    let syncer = FriendSyncer::new(
        FriendSyncerConfig {
            poll_interval: Duration::from_secs(60),
        },
        dao.clone(),
        Arc::new(HttpConnector::new(reqwest::Client::new(), base)),
        Connectivity::default(),
    );
    (syncer, dao)
}

#[tokio::test]
async fn api_round_trip_against_stub() {
    let (base, stub) = spawn_stub().await;
    let client = api(&base, "u1", Some("u1"));

    assert!(client.fetch_all().await.is_empty());

    client.upsert(&friend("1", "Bob", 100)).await.unwrap();
    client
        .batch_upsert(&[friend("2", "Alice", 200), friend("1", "Bob", 300)])
        .await
        .unwrap();

    let fetched = client.fetch_all().await;
    assert_eq!(fetched, vec![friend("2", "Alice", 200), friend("1", "Bob", 300)]);

    client.delete("2").await.unwrap();
    // 删除不存在的 ID 也返回成功
    client.delete("missing").await.unwrap();
    assert_eq!(stub.friends_of("u1"), vec![friend("1", "Bob", 300)]);
    assert!(!client.status().is_syncing());
    assert!(client.status().last_error().is_none());
}

#[tokio::test]
async fn ids_are_path_encoded() {
    let (base, stub) = spawn_stub().await;
    let client = api(&base, "u1", Some("u1"));
    client.upsert(&friend("a b/c", "Odd", 1)).await.unwrap();
    assert_eq!(stub.friends_of("u1")[0].id, "a b/c");
}

#[tokio::test]
async fn missing_token_fails_before_network() {
    let (base, stub) = spawn_stub().await;
    let client = api(&base, "u1", None);

    assert_eq!(
        client.upsert(&friend("1", "Bob", 1)).await,
        Err(SyncError::Unauthenticated)
    );
    assert_eq!(client.delete("1").await, Err(SyncError::Unauthenticated));
    assert!(client.fetch_all().await.is_empty());
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
    assert!(client.status().last_error().is_some());
}

#[tokio::test]
async fn rejected_token_surfaces_http_401() {
    let (base, _stub) = spawn_stub().await;
    let client = api(&base, "u1", Some("bad"));

    let err = client.upsert(&friend("1", "Bob", 1)).await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Http {
            status: 401,
            body: "Unauthorized".to_string()
        }
    );
    assert!(err.is_auth());

    assert!(client.fetch_all().await.is_empty());
    assert!(client.status().last_error().is_some());
}

#[tokio::test]
async fn users_are_isolated_on_the_server() {
    let (base, _stub) = spawn_stub().await;
    api(&base, "u1", Some("u1"))
        .upsert(&friend("1", "Alice", 1))
        .await
        .unwrap();
    assert!(api(&base, "u2", Some("u2")).fetch_all().await.is_empty());
}

#[tokio::test]
async fn syncer_reconciles_newer_remote_record() {
    let (base, stub) = spawn_stub().await;
    stub.seed("u1", vec![friend("1", "A", 200)]);
    let (syncer, dao) = syncer_against(&base).await;
    dao.save(Some("u1"), &[friend("1", "A", 100)]).await;

    syncer.activate(Some("u1"), Some("u1")).await;
    syncer.settle().await;

    assert_eq!(syncer.phase(), SyncPhase::Reconciled);
    assert_eq!(syncer.friends(), vec![friend("1", "A", 200)]);
    assert_eq!(dao.load(Some("u1")).await, vec![friend("1", "A", 200)]);
    syncer.shutdown();
}

#[tokio::test]
async fn syncer_pushes_local_list_to_empty_server() {
    let (base, stub) = spawn_stub().await;
    let (syncer, dao) = syncer_against(&base).await;
    dao.save(Some("u1"), &[friend("1", "A", 100), friend("2", "B", 200)])
        .await;

    syncer.activate(Some("u1"), Some("u1")).await;
    syncer.settle().await;

    let mut remote = stub.friends_of("u1");
    remote.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(remote, vec![friend("1", "A", 100), friend("2", "B", 200)]);
    assert!(!syncer.has_unsynced_changes());
    syncer.shutdown();
}

#[tokio::test]
async fn syncer_mutations_reach_the_server() {
    let (base, stub) = spawn_stub().await;
    let (syncer, _dao) = syncer_against(&base).await;
    syncer.activate(Some("u1"), Some("u1")).await;
    syncer.settle().await;

    let alice = syncer.add_friend("  alice ").await.unwrap();
    let bob = syncer.add_friend("BOB").await.unwrap();
    syncer.settle().await;
    let mut names: Vec<String> = stub.friends_of("u1").into_iter().map(|f| f.name).collect();
    names.sort();
    assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
    assert_eq!(syncer.friends(), vec![alice.clone(), bob.clone()]);

    let touched = syncer.update_last_contact(&alice.id).await.unwrap();
    syncer.remove_friend(&bob.id).await;
    syncer.settle().await;
    assert_eq!(stub.friends_of("u1"), vec![touched]);
    assert!(syncer.last_sync_error().is_none());
    syncer.shutdown();
}

#[tokio::test]
async fn syncer_keeps_local_state_when_token_is_rejected() {
    let (base, stub) = spawn_stub().await;
    let (syncer, dao) = syncer_against(&base).await;
    syncer.activate(Some("u1"), Some("bad")).await;
    syncer.settle().await;

    let carol = syncer.add_friend("carol").await.unwrap();
    syncer.settle().await;

    assert_eq!(syncer.friends(), vec![carol.clone()]);
    assert_eq!(dao.load(Some("u1")).await, vec![carol]);
    assert!(syncer.last_sync_error().is_some());
    assert!(syncer.has_unsynced_changes());
    assert!(stub.friends_of("u1").is_empty());
    syncer.shutdown();
}
