/// Integration tests for the database layer
/// Tests conversation and thread workflows through direct DB calls
use campus_chat_server::db::{Database, DbPool};

async fn register(pool: &DbPool, id: i64, name: &str) {
    Database::register_user(pool, Some(id), name, &format!("{}@campus.edu", name.to_lowercase()), "student")
        .await
        .expect("Failed to register user");
}

#[tokio::test]
async fn test_conversation_workflow() {
    let pool = campus_chat_server::db::create_test_pool();
    register(&pool, 1, "Alice").await;
    register(&pool, 2, "Bob").await;
    register(&pool, 3, "Carol").await;

    Database::store_message(&pool, 1, 2, "hi bob").await.expect("Failed to store");
    Database::store_message(&pool, 3, 1, "hi alice").await.expect("Failed to store");

    // Most recent conversation first
    let conversations = Database::list_conversations(&pool, 1).await.expect("Query failed");
    let others: Vec<i64> = conversations.iter().map(|c| c.other_user_id).collect();
    assert_eq!(others, vec![3, 2]);
    assert_eq!(conversations[0].unread_count, 1);
    assert_eq!(conversations[1].unread_count, 0);

    // Bob only sees his own conversation
    let conversations = Database::list_conversations(&pool, 2).await.expect("Query failed");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].other_user_id, 1);
    assert_eq!(conversations[0].last_message, "hi bob");
}

#[tokio::test]
async fn test_thread_isolation() {
    let pool = campus_chat_server::db::create_test_pool();
    register(&pool, 1, "Alice").await;
    register(&pool, 2, "Bob").await;
    register(&pool, 3, "Carol").await;

    Database::store_message(&pool, 1, 2, "for bob").await.unwrap();
    Database::store_message(&pool, 1, 3, "for carol").await.unwrap();

    let thread = Database::get_thread(&pool, 1, 2).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].content, "for bob");
}

#[tokio::test]
async fn test_file_database_persists_across_pools() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("campus.db");
    let db_path = db_path.to_str().unwrap();

    {
        let pool = campus_chat_server::db::create_pool(db_path).expect("Failed to open db");
        register(&pool, 1, "Alice").await;
        register(&pool, 2, "Bob").await;
        Database::store_message(&pool, 1, 2, "persisted").await.unwrap();
    }

    let pool = campus_chat_server::db::create_pool(db_path).expect("Failed to reopen db");
    let thread = Database::get_thread(&pool, 2, 1).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].content, "persisted");
}
