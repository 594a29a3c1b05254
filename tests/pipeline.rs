use std::path::{Path, PathBuf};
use std::sync::Arc;

use shopgraph::db::{migrate, Db};
use shopgraph::llm::{CompletionClient, OpenAiChatClient};
use shopgraph::{Config, Pipeline, ShopgraphError};
use tempfile::TempDir;

const SEED: &str = "
INSERT INTO nodes (node_id, name) VALUES
    (1, '手机购物决策'), (2, '性能评估'), (3, '处理器性能'), (4, '内存配置'),
    (5, '价格考虑'), (6, '价格区间'), (7, '性价比'), (8, '学生群体'),
    (9, '续航能力'), (10, '电池容量'), (11, '外观设计'), (12, '机身材质');
INSERT INTO node_labels VALUES
    (1, 'Decision'), (2, 'Stage'), (3, 'Factor'), (4, 'Factor'), (5, 'Stage'),
    (6, 'Factor'), (7, 'Factor'), (8, 'UserGroup'), (9, 'Factor'), (10, 'Factor'),
    (11, 'Stage'), (12, 'Factor');
INSERT INTO relations (relation_id, source_id, target_id, relation_type) VALUES
    (1, 1, 2, 'INCLUDES'), (2, 2, 3, 'CONTAINS'), (3, 2, 4, 'CONTAINS'),
    (4, 1, 5, 'INCLUDES'), (5, 5, 6, 'CONTAINS'), (6, 5, 7, 'CONTAINS'),
    (7, 1, 11, 'INCLUDES'), (8, 11, 12, 'CONTAINS'),
    (9, 8, 7, 'REQUIRES'), (10, 8, 9, 'REQUIRES'), (11, 9, 10, 'RELATES_TO');
";

fn write_config(dir: &TempDir, db_path: &Path, base_url: &str) -> Config {
    let path = dir.path().join("config.toml");
    let content = format!(
        "[shopgraph]\ndb_path = '{}'\nmax_degree = 2\n\n[llm]\nbase_url = '{}'\nmodel = 'test-model'\napi_key_env = 'SHOPGRAPH_IT_UNSET_KEY'\nparse_timeout_secs = 2\nprune_timeout_secs = 2\n",
        db_path.display(),
        base_url
    );
    std::fs::write(&path, content).unwrap();
    Config::from_file(&path).unwrap()
}

async fn seeded_store(dir: &TempDir) -> PathBuf {
    let db_path = dir.path().join("graph.db");
    let db = Db::new(&db_path);
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    db.with_connection(move |conn| {
        migrate::run_migrations(conn, &migrations_dir)?;
        conn.execute_batch(SEED)?;
        Ok(())
    })
    .await
    .unwrap();
    db_path
}

fn json_block(report: &str) -> serde_json::Value {
    let start = report.find("```json\n").unwrap() + "```json\n".len();
    let end = report.rfind("\n```").unwrap();
    serde_json::from_str(&report[start..end]).unwrap()
}

#[tokio::test]
async fn test_unreachable_model_uses_fallbacks_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_store(&dir).await;
    let config = write_config(&dir, &db_path, "http://127.0.0.1:9");

    let client = OpenAiChatClient::from_config(&config.llm, "test-key".to_string()).unwrap();
    let client: Arc<dyn CompletionClient> = Arc::new(client);
    let pipeline = Pipeline::with_client(&config, Some(client)).await.unwrap();

    let output = pipeline.answer("学生想要3000元的手机，续航要好").await.unwrap();

    // Keyword fallback parse
    assert_eq!(output.intent.price_range, "3000元左右");
    assert_eq!(output.intent.user_groups, vec!["学生"]);
    assert_eq!(output.intent.explicit_needs, vec!["续航"]);
    assert!(!output.model_pruned);
    assert!(output.failed_strategies.is_empty());
    assert!(output.relation_count > 0);

    let report = &output.report;
    assert!(report.starts_with("# 手机购买深度研究报告"));
    assert!(report.contains("**学生群体关注点**"));
    assert!(report.contains("**续航需求相关**"));
    assert!(report.contains("**性能评估**:\n• 处理器性能"));

    let json = json_block(report);
    let aspects = json["relevant_aspects"].as_object().unwrap();
    assert!(!aspects.is_empty());
    assert!(aspects.contains_key("价格考虑"));
}

#[tokio::test]
async fn test_without_client_produces_report() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_store(&dir).await;
    let config = write_config(&dir, &db_path, "http://127.0.0.1:9");

    let pipeline = Pipeline::with_client(&config, None).await.unwrap();
    let output = pipeline.answer_with_degree("看看外观好看的", 1).await.unwrap();
    assert!(output.report.contains("**外观设计**:\n• 机身材质"));
    assert!(!json_block(&output.report)["relevant_aspects"].as_object().unwrap().is_empty());

    assert_eq!(output.nodes_by_label["Decision"], 1);
    assert_eq!(output.nodes_by_label["Stage"], 3);
    assert_eq!(output.nodes_by_label["UserGroup"], 1);
}

#[tokio::test]
async fn test_blank_query_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_store(&dir).await;
    let config = write_config(&dir, &db_path, "http://127.0.0.1:9");

    let pipeline = Pipeline::with_client(&config, None).await.unwrap();
    let err = pipeline.answer("   ").await.unwrap_err();
    assert!(matches!(err, ShopgraphError::InvalidInput(_)));
}

#[tokio::test]
async fn test_model_paths_used_when_replies_are_valid() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_store(&dir).await;
    let mut server = mockito::Server::new_async().await;

    let intent_reply = r#"{"product_category": "手机", "price_range": "3000元左右", "user_groups": ["学生"], "explicit_needs": ["性能"], "implicit_needs": [], "usage_scenarios": ["学习"]}"#;
    let _parse = server
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({"max_tokens": 800})))
        .with_status(200)
        .with_body(serde_json::json!({"choices": [{"message": {"content": intent_reply}}]}).to_string())
        .create_async()
        .await;

    let prune_reply = r#"{"性能评估": ["处理器性能", "不存在的因子"], "学生群体": ["性价比"]}"#;
    let _prune = server
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({"max_tokens": 1000})))
        .with_status(200)
        .with_body(serde_json::json!({"choices": [{"message": {"content": prune_reply}}]}).to_string())
        .create_async()
        .await;

    let config = write_config(&dir, &db_path, &server.url());
    let client = OpenAiChatClient::from_config(&config.llm, "test-key".to_string()).unwrap();
    let client: Arc<dyn CompletionClient> = Arc::new(client);
    let pipeline = Pipeline::with_client(&config, Some(client)).await.unwrap();

    let output = pipeline.answer("学生党，性能优先").await.unwrap();
    assert_eq!(output.intent.usage_scenarios, vec!["学习"]);
    assert!(output.model_pruned);

    let json = json_block(&output.report);
    let aspects = &json["relevant_aspects"];
    assert_eq!(aspects["性能评估"], serde_json::json!(["处理器性能"]));
    assert_eq!(aspects["学生群体"], serde_json::json!(["性价比"]));
    // Important categories the model omitted are kept.
    assert!(aspects["价格考虑"].as_array().is_some_and(|items| !items.is_empty()));
}

#[tokio::test]
async fn test_store_without_schema_is_fatal() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("empty.db");
    let config = write_config(&dir, &db_path, "http://127.0.0.1:9");
    assert!(Pipeline::with_client(&config, None).await.is_err());
}
