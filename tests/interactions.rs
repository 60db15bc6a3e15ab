//! End-to-end tests of the HTTP API over the in-memory store: the chat
//! flow, request validation, provider management and search.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use ragbridge::config::Config;
use ragbridge::server::{router, AppState};
use ragbridge_core::models::{
    ContentPart, Document, Embedding, ProviderCategory, ProviderConfig, ProviderStatus, Role,
    SourceAttribution,
};
use ragbridge_core::store::memory::InMemoryStorage;
use ragbridge_core::store::{DatasourceStore, InteractionStore, ProviderStore, Storage};

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config() -> Config {
    toml::from_str(
        r#"
[db]
path = "./unused.sqlite"

[retrieval]
search_limit = 3

[providers]
timeout_secs = 2
"#,
    )
    .unwrap()
}

struct TestServer {
    base: String,
    store: Arc<InMemoryStorage>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let store = Arc::new(InMemoryStorage::new());
        let shared: Arc<dyn Storage> = store.clone();
        let app = router(AppState::new(shared, test_config(), CancellationToken::new()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let server = Self {
            base: format!("http://{}", addr),
            store,
            client: reqwest::Client::new(),
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("Server did not become ready");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn add_provider(
        &self,
        id: &str,
        category: ProviderCategory,
        provider_type: &str,
        settings: Value,
    ) {
        self.store
            .create_provider(&ProviderConfig {
                id: id.to_string(),
                category,
                name: id.to_string(),
                provider_type: provider_type.to_string(),
                status: ProviderStatus::Active,
                settings,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn with_noop_providers(self) -> Self {
        self.add_provider(
            "emb",
            ProviderCategory::Embedding,
            "noop",
            json!({"vector": [1.0, 0.0]}),
        )
        .await;
        self.add_provider(
            "llm",
            ProviderCategory::Llm,
            "noop",
            json!({"response": "Thank you for your message"}),
        )
        .await;
        self
    }

    async fn create_interaction(&self, query: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/interactions"))
            .json(&json!({ "query": query }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    async fn send(&self, interaction_id: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/interactions/{}/message", interaction_id)))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn embedded_document(id: &str, body: &str, vector: Vec<f32>) -> Document {
    let mut doc = Document::new(id, body).with_title(format!("{}.md", id));
    doc.source = Some(SourceAttribution {
        datasource_id: "ds-1".into(),
        name: "docs".into(),
        source_type: "filesystem".into(),
    });
    doc.fetched_at = Some(Utc::now());
    doc.embedding = Embedding {
        parts: vec![ContentPart {
            text: body.to_string(),
            vector,
            provider_id: "emb".into(),
            token_count: 2,
            generated_at: Utc::now(),
        }],
    };
    doc
}

// ─── Chat flow ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_message_round_trip_persists_both_turns() {
    let server = TestServer::start().await.with_noop_providers().await;
    server
        .store
        .store(&embedded_document("deploy", "Deploy with the release script", vec![1.0, 0.0]))
        .await
        .unwrap();

    let id = server.create_interaction("Test message").await;
    let resp = server.send(&id, json!({"message": "Test message"})).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"response":"Thank you for your message"}"#
    );

    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    let turns: Vec<(Role, &str)> = interaction
        .conversations
        .iter()
        .map(|c| (c.role, c.text.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Role::User, "Test message"),
            (Role::System, "Thank you for your message"),
        ]
    );
}

#[tokio::test]
async fn test_query_alias_is_accepted() {
    let server = TestServer::start().await.with_noop_providers().await;
    let id = server.create_interaction("hello").await;

    let resp = server.send(&id, json!({"query": "hello again"})).await;
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .get(server.url(&format!("/api/v1/interactions/{}", id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["conversations"][0]["role"], "user");
    assert_eq!(body["conversations"][0]["text"], "hello again");
    assert_eq!(body["conversations"][1]["role"], "system");
}

#[tokio::test]
async fn test_malformed_json_touches_no_storage() {
    let server = TestServer::start().await.with_noop_providers().await;
    let id = server.create_interaction("q").await;
    let before = server.store.operations();

    let resp = server
        .client
        .post(server.url(&format!("/api/v1/interactions/{}/message", id)))
        .header("content-type", "application/json")
        .body("{\"message\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = server
        .client
        .post(server.url(&format!("/api/v1/interactions/{}/message", id)))
        .header("content-type", "application/json")
        .body(r#"{"text": "wrong field"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    assert_eq!(server.store.operations(), before);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let server = TestServer::start().await.with_noop_providers().await;
    let id = server.create_interaction("q").await;

    let resp = server.send(&id, json!({"message": "   "})).await;
    assert_eq!(resp.status(), 400);

    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    assert!(interaction.conversations.is_empty());
}

#[tokio::test]
async fn test_unknown_interaction_is_404() {
    let server = TestServer::start().await.with_noop_providers().await;

    let resp = server.send("does-not-exist", json!({"message": "hi"})).await;
    assert_eq!(resp.status(), 404);

    let resp = server
        .client
        .get(server.url("/api/v1/interactions/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_missing_llm_provider_is_internal_error() {
    let server = TestServer::start().await;
    server
        .add_provider(
            "emb",
            ProviderCategory::Embedding,
            "noop",
            json!({"vector": [1.0]}),
        )
        .await;
    let id = server.create_interaction("q").await;

    let resp = server.send(&id, json!({"message": "anyone there?"})).await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].is_string());
    assert!(body["error"].as_str().unwrap().contains("llm"));

    // The LLM is resolved before the user turn is written.
    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    assert!(interaction.conversations.is_empty());
}

#[tokio::test]
async fn test_llm_failure_leaves_user_turn() {
    let server = TestServer::start().await;
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_endpoint = format!("http://{}/v1", closed.local_addr().unwrap());
    drop(closed);

    server
        .add_provider(
            "emb",
            ProviderCategory::Embedding,
            "noop",
            json!({"vector": [1.0]}),
        )
        .await;
    server
        .add_provider(
            "llm",
            ProviderCategory::Llm,
            "openai",
            json!({"endpoint": dead_endpoint, "model": "gpt-test"}),
        )
        .await;
    let id = server.create_interaction("q").await;

    let resp = server.send(&id, json!({"message": "will this fail?"})).await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "failed to generate response");

    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    assert_eq!(interaction.conversations.len(), 1);
    assert_eq!(interaction.conversations[0].role, Role::User);
    assert_eq!(interaction.conversations[0].text, "will this fail?");
}

#[tokio::test]
async fn test_missing_embedding_provider_leaves_user_turn() {
    let server = TestServer::start().await;
    server
        .add_provider(
            "llm",
            ProviderCategory::Llm,
            "noop",
            json!({"response": "unused"}),
        )
        .await;
    let id = server.create_interaction("q").await;

    let resp = server.send(&id, json!({"message": "no embedder"})).await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].is_string());
    assert!(body["error"].as_str().unwrap().contains("embedding"));

    // The embedder is resolved after the user turn is written.
    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    assert_eq!(interaction.conversations.len(), 1);
    assert_eq!(interaction.conversations[0].role, Role::User);
    assert_eq!(interaction.conversations[0].text, "no embedder");
}

#[tokio::test]
async fn test_user_turn_is_stored_as_sent() {
    let server = TestServer::start().await.with_noop_providers().await;
    let id = server.create_interaction("q").await;

    let resp = server.send(&id, json!({"message": "  padded question \n"})).await;
    assert_eq!(resp.status(), 200);

    let interaction = server.store.get_interaction(&id).await.unwrap().unwrap();
    assert_eq!(interaction.conversations[0].role, Role::User);
    assert_eq!(interaction.conversations[0].text, "  padded question \n");
}

#[tokio::test]
async fn test_list_interactions_newest_first() {
    let server = TestServer::start().await;
    let first = server.create_interaction("first").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = server.create_interaction("second").await;

    let body: Value = server
        .client
        .get(server.url("/api/v1/interactions?page=1&per_page=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["id"], second.as_str());
    assert_eq!(body["items"][1]["id"], first.as_str());
}

// ─── Providers ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_provider_lifecycle() {
    let server = TestServer::start().await;
    let c = &server.client;

    let resp = c
        .post(server.url("/embedding-provider"))
        .json(&json!({
            "name": "a",
            "type": "noop",
            "settings": {"vector": [1.0]},
            "status": "active"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let a: Value = resp.json().await.unwrap();
    let a_id = a["id"].as_str().unwrap().to_string();
    assert_eq!(a["status"], "active");
    assert_eq!(a["category"], "embedding");

    let b: Value = c
        .post(server.url("/embedding-provider"))
        .json(&json!({"name": "b", "provider_type": "noop", "settings": {"vector": [0.5]}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let b_id = b["id"].as_str().unwrap().to_string();
    assert_eq!(b["status"], "inactive");

    let resp = c
        .put(server.url(&format!("/embedding-provider/{}/activate", b_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let active: Value = c
        .get(server.url("/embedding-provider?status=active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active["total"], 1);
    assert_eq!(active["items"][0]["id"], b_id.as_str());

    let resp = c
        .put(server.url(&format!("/embedding-provider/{}", a_id)))
        .json(&json!({"name": "renamed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "renamed");

    let resp = c
        .put(server.url(&format!("/embedding-provider/{}/deactivate", b_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let none_active: Value = c
        .get(server.url("/embedding-provider?status=active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(none_active["total"], 0);

    let resp = c
        .delete(server.url(&format!("/embedding-provider/{}", a_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let resp = c
        .get(server.url(&format!("/embedding-provider/{}", a_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Categories are separate namespaces.
    let resp = c
        .get(server.url(&format!("/llm-provider/{}", b_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_provider_validation() {
    let server = TestServer::start().await;
    let c = &server.client;

    let resp = c
        .post(server.url("/llm-provider"))
        .json(&json!({"name": "x", "type": "cohere", "settings": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("cohere"));

    let resp = c
        .post(server.url("/llm-provider"))
        .json(&json!({"name": "x", "type": "noop", "settings": {"vector": [1.0]}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = c
        .get(server.url("/llm-provider?status=enabled"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = c.get(server.url("/widget-provider")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

// ─── Search ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_by_vector_and_keyword() {
    let server = TestServer::start().await;
    for doc in [
        embedded_document("rust", "ownership and borrowing", vec![1.0, 0.0]),
        embedded_document("go", "goroutines and channels", vec![0.0, 1.0]),
    ] {
        server.store.store(&doc).await.unwrap();
    }

    // No embedding provider yet: keyword ranking.
    let body: Value = server
        .client
        .post(server.url("/api/v1/search"))
        .json(&json!({"query": "channels"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["hits"][0]["document_id"], "go");

    // With the noop embedder every query maps to [1, 0].
    let server = server.with_noop_providers().await;
    let body: Value = server
        .client
        .post(server.url("/api/v1/search"))
        .json(&json!({"query": "anything", "limit": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["hits"].as_array().unwrap().len(), 1);
    assert_eq!(body["hits"][0]["document_id"], "rust");

    let resp = server
        .client
        .post(server.url("/api/v1/search"))
        .json(&json!({"query": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
