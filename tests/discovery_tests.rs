/// スキーマ探索・階層探索の統合テスト
///
/// wiremock のモックサーバーに対して JiraClient 経由でリクエストする。
///
/// ```
/// cargo test --test discovery_tests
/// ```
use jira_fields::{
    Auth, FieldSchema, FieldType, JiraClient, JiraConfig, JpoHierarchyDiscovery, LookupCache,
    ParentFieldDiscovery, ProjectSchema, SchemaDiscovery,
};
use jira_fields::hierarchy::{NULL_SENTINEL, get_parent_level, is_valid_parent};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Arc<JiraClient> {
    let config = JiraConfig::new(
        server.uri(),
        Auth::Basic {
            username: "test@example.com".to_string(),
            api_token: "mock-api-token".to_string(),
        },
    )
    .unwrap();
    Arc::new(JiraClient::new(config).unwrap())
}

async fn mount_issue_types(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/createmeta/PROJ/issuetypes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0,
            "maxResults": 50,
            "total": 3,
            "issueTypes": [
                {"id": "10000", "name": "Epic", "subtask": false},
                {"id": "10001", "name": "Task", "subtask": false},
                {"id": "10002", "name": "Sub-task", "subtask": true}
            ]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn field(id: &str, name: &str, field_type: &str) -> serde_json::Value {
    json!({"fieldId": id, "name": name, "required": false, "schema": {"type": field_type}})
}

#[tokio::test]
async fn test_schema_pagination_collects_every_field_once() {
    // Given: フィールド一覧が3ページに分かれ、ページ境界で重複IDが返る
    let server = MockServer::start().await;
    mount_issue_types(&server, 1).await;
    let fields_path = "/rest/api/3/issue/createmeta/PROJ/issuetypes/10001";
    Mock::given(method("GET"))
        .and(path(fields_path))
        .and(query_param("startAt", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0, "maxResults": 2, "total": 5,
            "fields": [field("summary", "Summary", "string"), field("duedate", "Due date", "date")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(fields_path))
        .and(query_param("startAt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 2, "maxResults": 2, "total": 5,
            "fields": [field("duedate", "Due date", "date"), field("priority", "Priority", "priority")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(fields_path))
        .and(query_param("startAt", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 4, "maxResults": 2, "total": 5,
            "fields": [field("customfield_10016", "Story Points", "number")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = SchemaDiscovery::new(client_for(&server), None);

    // When: スキーマを取得する
    let schema = discovery.get_fields_for_issue_type("PROJ", "task").await.unwrap();

    // Then: 全ページのフィールドが重複なく揃う
    let ids: Vec<&String> = schema.fields.keys().collect();
    let unique: HashSet<&String> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(schema.len(), 4);
    assert_eq!(schema.issue_type, "Task");
    assert_eq!(schema.issue_type_id, "10001");
    assert_eq!(schema.field("customfield_10016").unwrap().field_type, FieldType::Number);
}

#[tokio::test]
async fn test_unknown_issue_type_lists_available_types() {
    // Given: Epic / Task / Sub-task のみのプロジェクト
    let server = MockServer::start().await;
    mount_issue_types(&server, 1).await;
    let discovery = SchemaDiscovery::new(client_for(&server), None);

    // When: 存在しない課題タイプを指定する
    let err = discovery
        .get_fields_for_issue_type("PROJ", "Incident")
        .await
        .unwrap_err();

    // Then: NotFound に利用可能な課題タイプが含まれる
    assert!(err.is_not_found());
    assert_eq!(err.available_values(), ["Epic", "Task", "Sub-task"]);
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/createmeta/NOPE/issuetypes"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errorMessages": ["No project"]})))
        .mount(&server)
        .await;
    let discovery = SchemaDiscovery::new(client_for(&server), None);

    let err = discovery.get_fields_for_issue_type("NOPE", "Task").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("NOPE"), "{}", err);
}

#[tokio::test]
async fn test_stale_schema_is_refreshed_once_for_concurrent_callers() {
    // Given: stale になったスキーマがキャッシュにあり、リモートの応答は遅い
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/createmeta/PROJ/issuetypes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"total": 1, "issueTypes": [{"id": "10001", "name": "Task"}]}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/createmeta/PROJ/issuetypes/10001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "fields": [field("summary", "Summary", "string"), field("labels", "Labels", "array")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = LookupCache::in_memory();
    let client = client_for(&server);
    let stale = ProjectSchema::new("PROJ", "Task", "10001")
        .with_field(FieldSchema::new("summary", "Summary", FieldType::String));
    let key = SchemaDiscovery::cache_key(&server.uri(), "PROJ", "Task");
    cache.set_json(&key, &stale, 0).await.unwrap();
    let discovery = SchemaDiscovery::new(client, Some(cache.clone()));

    // When: 10件の同時呼び出し
    let calls = (0..10).map(|_| discovery.get_fields_for_issue_type("PROJ", "Task"));
    let results = futures::future::join_all(calls).await;

    // Then: 全員が即座に古い値を受け取る
    for result in results {
        assert_eq!(result.unwrap().len(), 1);
    }

    // Then: バックグラウンド更新は1回だけで、キャッシュは新しい値になる
    tokio::time::sleep(Duration::from_millis(600)).await;
    let refreshed = cache.get_json::<ProjectSchema>(&key).await.unwrap().unwrap();
    assert!(!refreshed.is_stale);
    assert_eq!(refreshed.value.len(), 2);
    assert_eq!(cache.in_flight_count(), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_missing_hierarchy_plugin_is_cached_until_refresh() {
    // Given: 階層エンドポイントが存在しない
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/jpo-api/1.0/hierarchy"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    let cache = LookupCache::in_memory();
    let discovery = JpoHierarchyDiscovery::new(client_for(&server), Some(cache.clone()));

    // When: 2回取得する
    let first = discovery.get_hierarchy(false).await.unwrap();
    let second = discovery.get_hierarchy(false).await.unwrap();

    // Then: どちらも None で、2回目はキャッシュから返る
    assert!(first.is_none());
    assert!(second.is_none());
    let cached = cache
        .get(&JpoHierarchyDiscovery::cache_key(&server.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.value, NULL_SENTINEL);

    // When: 強制更新する
    let refreshed = discovery.get_hierarchy(true).await.unwrap();

    // Then: エンドポイントをもう一度呼ぶ
    assert!(refreshed.is_none());
    server.verify().await;
}

#[tokio::test]
async fn test_hierarchy_is_normalized_and_queried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/jpo-api/1.0/hierarchy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 2, "title": "Initiative", "issueTypeIds": [10020]},
            {"id": 0, "title": "Story", "issueTypeIds": ["10001", "10004"]},
            {"id": 1, "title": "Epic", "issueTypeIds": ["10000"]}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let discovery = JpoHierarchyDiscovery::new(client_for(&server), Some(LookupCache::in_memory()));

    let levels = discovery.get_hierarchy(false).await.unwrap().unwrap();
    // 2回目はキャッシュから
    let again = discovery.get_hierarchy(false).await.unwrap().unwrap();

    assert_eq!(levels, again);
    assert_eq!(levels.iter().map(|l| l.id).collect::<Vec<_>>(), [0, 1, 2]);
    assert_eq!(levels[2].issue_type_ids, ["10020"]);
    assert_eq!(get_parent_level("10001", &levels).map(|l| l.title.as_str()), Some("Epic"));
    assert!(is_valid_parent("10004", "10000", &levels));
    assert!(!is_valid_parent("10000", "10001", &levels));
}

#[tokio::test]
async fn test_parent_field_discovery() {
    // Given: Task には Epic Link と Parent Link のカスタムフィールドがある
    let server = MockServer::start().await;
    mount_issue_types(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/createmeta/PROJ/issuetypes/10001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 3,
            "fields": [
                field("summary", "Summary", "string"),
                {"fieldId": "customfield_10014", "name": "Epic Link", "schema": {"type": "any", "custom": "com.pyxis.greenhopper.jira:gh-epic-link"}},
                {"fieldId": "customfield_10100", "name": "Parent Link", "schema": {"type": "any", "custom": "com.atlassian.jpo:jpo-custom-field-parent"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = LookupCache::in_memory();
    let schema = SchemaDiscovery::new(client_for(&server), Some(cache.clone()));
    let discovery = ParentFieldDiscovery::new(schema, Some(cache));

    // When/Then: 同義語の優先順（epic link > parent link）で選ばれ、2回目はキャッシュから
    for _ in 0..2 {
        let key = discovery.get_parent_field_key("PROJ", "Task").await.unwrap();
        assert_eq!(key.as_deref(), Some("customfield_10014"));
    }

    // Then: サブタスクはスキーマを見ずに標準の parent
    let subtask = discovery.get_parent_field_key("PROJ", "Sub-task").await.unwrap();
    assert_eq!(subtask.as_deref(), Some("parent"));
    server.verify().await;
}
