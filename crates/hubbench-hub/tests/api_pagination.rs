use std::path::{Path, PathBuf};
use std::sync::Arc;

use hubbench_hub::{
    Hub, HubConfig, HubStore, InMemoryRouteTable, NullSessionLifecycle, RouteTable,
    SessionLifecycle, DB_FILE_NAME, PAGINATION_MEDIA_TYPE,
};
use serde_json::Value;

const TOKEN: &str = "0123456789abcdef";

fn seed(dir: &Path, tenants: usize, sessions: usize) -> PathBuf {
    let db_path = dir.join(DB_FILE_NAME);
    let store = HubStore::open(&db_path).unwrap();
    store
        .in_transaction(|s| {
            s.insert_credential(TOKEN, "admin")?;
            for i in 0..tenants {
                let id = s.insert_tenant(&format!("tenant-{i}"))?;
                if i < sessions {
                    s.attach_session(id, "127.0.0.1", 12345)?;
                }
            }
            Ok(())
        })
        .unwrap();
    db_path
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn pagination_walks_to_a_null_next_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed(dir.path(), 120, 10);

    let routes = Arc::new(InMemoryRouteTable::new());
    let mut hub = Hub::new(
        HubConfig::new(db_path),
        Arc::new(NullSessionLifecycle::new()),
        routes.clone(),
    );
    let summary = hub.init_store().unwrap();
    assert_eq!(summary.tenants, 120);
    assert_eq!(summary.sessions, 10);

    runtime().block_on(async {
        let stats = hub.restore_sessions().await.unwrap();
        assert_eq!(stats.checked, 10);
        assert_eq!(stats.running, 10);
        assert_eq!(routes.list_routes().await.unwrap().len(), 10);
        assert_eq!(
            routes.list_routes().await.unwrap()["/user/tenant-0/"].target,
            "http://127.0.0.1:12345"
        );

        let handle = hub.serve_api().await.unwrap();
        let client = reqwest::Client::new();

        let probe = client.get(handle.api_url()).send().await.unwrap();
        assert!(probe.status().is_success());

        let users_url = format!("{}/users", handle.api_url());
        let mut offset: Option<u64> = None;
        let mut pages = 0;
        let mut names = Vec::new();
        loop {
            let mut request = client
                .get(&users_url)
                .header("Authorization", format!("token {TOKEN}"))
                .header("Accept", PAGINATION_MEDIA_TYPE);
            if let Some(offset) = offset {
                request = request.query(&[("offset", offset)]);
            }
            let body: Value = request.send().await.unwrap().json().await.unwrap();
            pages += 1;
            for item in body["items"].as_array().unwrap() {
                names.push(item["name"].as_str().unwrap().to_string());
            }
            assert_eq!(body["_pagination"]["total"].as_u64(), Some(120));
            match &body["_pagination"]["next"] {
                Value::Null => break,
                next => offset = Some(next["offset"].as_u64().unwrap()),
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(offset, Some(100));
        assert_eq!(names.len(), 120);
        assert_eq!(names[0], "tenant-0");
        assert_eq!(names[119], "tenant-119");

        handle.shutdown().await;
    });
}

#[test]
fn wrong_credential_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed(dir.path(), 5, 0);

    let mut hub = Hub::new(
        HubConfig::new(db_path),
        Arc::new(NullSessionLifecycle::new()),
        Arc::new(InMemoryRouteTable::new()),
    );
    hub.init_store().unwrap();

    runtime().block_on(async {
        let handle = hub.serve_api().await.unwrap();
        let client = reqwest::Client::new();
        let users_url = format!("{}/users", handle.api_url());

        let missing = client.get(&users_url).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 403);

        let wrong = client
            .get(&users_url)
            .header("Authorization", "token not-the-credential")
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status().as_u16(), 403);

        handle.shutdown().await;
    });
}

#[test]
fn plain_listing_without_pagination_accept_header() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed(dir.path(), 8, 3);

    let mut hub = Hub::new(
        HubConfig::new(db_path),
        Arc::new(NullSessionLifecycle::new()),
        Arc::new(InMemoryRouteTable::new()),
    );
    hub.init_store().unwrap();

    runtime().block_on(async {
        let handle = hub.serve_api().await.unwrap();
        let client = reqwest::Client::new();
        let body: Value = client
            .get(format!("{}/users", handle.api_url()))
            .header("Authorization", format!("token {TOKEN}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 8);
        assert!(items[0]["session"].is_object());
        assert!(items[7]["session"].is_null());

        handle.shutdown().await;
    });
}

#[test]
fn ended_sessions_are_not_restored() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = seed(dir.path(), 6, 4);

    let lifecycle = Arc::new(NullSessionLifecycle::new());
    let routes = Arc::new(InMemoryRouteTable::new());
    let mut hub = Hub::new(HubConfig::new(db_path), lifecycle.clone(), routes.clone());
    hub.init_store().unwrap();

    runtime().block_on(async {
        lifecycle.end("tenant-0").await;
        let stats = hub.restore_sessions().await.unwrap();
        assert_eq!(stats.checked, 4);
        assert_eq!(stats.running, 3);
        let routes = routes.list_routes().await.unwrap();
        assert!(!routes.contains_key("/user/tenant-0/"));
        assert!(routes.contains_key("/user/tenant-1/"));
    });
}
