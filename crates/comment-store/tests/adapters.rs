use std::sync::{Arc, Mutex};

use comment_store::{
    CachedServerActionAdapter, Error, QueryCacheAdapter, RestApiAdapter, RestConfig,
    ServerActionAdapter, ServerActions, StorageAdapter,
};
use comment_types::{Comment, EditorUpdate, NewComment};
use test_store::{TestStore, alice, bob, comment_at, doc, editor_state, mention, tag, text};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let store = TestStore::new().unwrap();
    let created = store
        .adapter
        .add_lexical_comment(
            NewComment::new(
                "ping @bob about #billing",
                doc(vec![text("ping "), mention("bob"), text(" about "), tag("billing")]),
                alice(),
            )
            .with_source(Some("doc-1".into()), Some("document".into())),
        )
        .await
        .unwrap();

    let reopened = store.reopen().unwrap();
    let comments = reopened.get_comments().await.unwrap();
    assert_eq!(comments, vec![created]);
    assert_eq!(comments[0].mentions[0].value, "bob");
    assert_eq!(comments[0].mentions[0].id.as_deref(), Some("bob"));
    assert_eq!(comments[0].tags[0].value, "billing");

    let raw = store.raw().unwrap().unwrap();
    assert!(raw[0]["createdAt"].is_string());
    assert_eq!(raw[0]["sourceType"], "document");
}

#[tokio::test]
async fn test_file_store_update_and_clear() {
    let store = TestStore::new().unwrap();
    let created = store
        .adapter
        .add_lexical_comment(NewComment::new("v1", editor_state("v1"), alice()))
        .await
        .unwrap();

    store
        .adapter
        .update_comment_with_editor_state(&created.id, EditorUpdate::new("v2", editor_state("v2")))
        .await
        .unwrap();
    let stored = store.reopen().unwrap().get_comments().await.unwrap();
    assert_eq!(stored[0].content, "v2");
    assert!(stored[0].is_edited);

    store.adapter.clear_all_storage().await.unwrap();
    assert_eq!(store.raw().unwrap(), None);
}

#[test]
fn test_adapters_sharing_a_directory_keep_every_write() {
    let store = TestStore::new().unwrap();
    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let adapter = store.reopen().unwrap();
            std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap();
                runtime.block_on(async {
                    for n in 0..25 {
                        let content = format!("writer {} note {}", writer, n);
                        adapter
                            .add_lexical_comment(NewComment::new(
                                content.clone(),
                                editor_state(&content),
                                alice(),
                            ))
                            .await
                            .unwrap();
                    }
                });
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let comments = runtime.block_on(store.adapter.get_comments()).unwrap();
    assert_eq!(comments.len(), 100);
}

#[tokio::test]
async fn test_threads_group_flat_replies() {
    let store = TestStore::new().unwrap();
    let comments = vec![
        comment_at("root-b", None, bob(), 20),
        comment_at("reply-2", Some("root-a"), bob(), 15),
        comment_at("root-a", None, alice(), 0),
        comment_at("reply-1", Some("root-a"), alice(), 5),
        comment_at("orphan", Some("gone"), alice(), 7),
    ];
    store.adapter.save_comments(&comments).await.unwrap();

    let threads = store.adapter.get_comment_threads(None, None).await.unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["root-a", "root-b"]);
    let reply_ids: Vec<&str> = threads[0].replies.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(reply_ids, ["reply-1", "reply-2"]);
    assert_eq!(threads[0].last_activity, comments[1].created_at);
    assert_eq!(threads[1].total_replies, 0);
}

#[tokio::test]
async fn test_cached_server_actions_compose_with_query_cache() {
    let backing: Arc<Mutex<Vec<Comment>>> = Arc::default();
    let (read, write) = (backing.clone(), backing.clone());
    let actions = ServerActions::new()
        .with_get_comments(move || {
            let read = read.clone();
            async move { Ok(read.lock().unwrap().clone()) }
        })
        .with_add_comment(move |comment| {
            let write = write.clone();
            async move {
                write.lock().unwrap().push(comment);
                Ok(())
            }
        });
    let adapter: QueryCacheAdapter<CachedServerActionAdapter> = QueryCacheAdapter::new(
        CachedServerActionAdapter::new(ServerActionAdapter::new(actions)),
    );

    assert!(adapter.get_comments().await.unwrap().is_empty());
    let created = adapter
        .add_lexical_comment(NewComment::new("hi", editor_state("hi"), alice()))
        .await
        .unwrap();
    assert_eq!(adapter.get_comments().await.unwrap(), vec![created.clone()]);
    assert_eq!(backing.lock().unwrap().clone(), vec![created]);

    let err = adapter.delete_comment(&"x".into()).await.unwrap_err();
    assert!(matches!(err, Error::NotImplemented { action: "deleteCommentAction" }));
}

/// Serve `responses` in order, one per connection, recording request lines.
async fn stub_server(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = seen.clone();
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8_lossy(&request);
            log.lock()
                .unwrap()
                .push(head.lines().next().unwrap_or_default().to_string());
            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });
    (format!("http://{}/api", addr), seen)
}

#[tokio::test]
async fn test_rest_adapter_reads_and_maps_errors() {
    let stored = vec![comment_at("c1", None, alice(), 0)];
    let (base_url, seen) = stub_server(vec![
        (200, serde_json::to_string(&stored).unwrap()),
        (200, "[]".to_string()),
        (500, "boom".to_string()),
    ])
    .await;
    let adapter = RestApiAdapter::new(&RestConfig::new(base_url)).unwrap();

    assert_eq!(adapter.get_comments().await.unwrap(), stored);
    let threads = adapter
        .get_comment_threads(Some("doc-1"), None)
        .await
        .unwrap();
    assert!(threads.is_empty());
    let err = adapter.delete_comment(&"c1".into()).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 500, ref body } if body == "boom"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        [
            "GET /api/comments HTTP/1.1",
            "GET /api/comments/threads?sourceId=doc-1 HTTP/1.1",
            "DELETE /api/comments/c1 HTTP/1.1",
        ]
    );
}
