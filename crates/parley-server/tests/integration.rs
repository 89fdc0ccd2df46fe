use parley_core::{ConversationStore, DbError, MessageRole};
use parley_server::SqlxDb;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

async fn setup_test_db() -> SqlxDb {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Invalid SQLite URL")
        .foreign_keys(true);
    // every in-memory connection is its own database, so keep exactly one
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite");

    let db = SqlxDb::new(pool);
    db.migrate().await.expect("Failed to run migrations");
    db
}

#[tokio::test]
async fn test_database_create_and_get_conversation() {
    let db = setup_test_db().await;

    let conversation = db
        .create_conversation("Trip planning")
        .await
        .expect("Failed to create conversation");
    assert_eq!(conversation.title, "Trip planning");
    assert!(conversation.messages.is_empty());
    assert_eq!(conversation.created_at, conversation.updated_at);

    let fetched = db
        .get_conversation(conversation.id)
        .await
        .expect("Failed to get conversation")
        .expect("Conversation not found");
    assert_eq!(fetched.id, conversation.id);
    assert_eq!(fetched.title, "Trip planning");
}

#[tokio::test]
async fn test_database_get_missing_conversation() {
    let db = setup_test_db().await;
    assert!(db.get_conversation(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_database_add_message_bumps_updated_at() {
    let db = setup_test_db().await;
    let conversation = db.create_conversation("Chat").await.unwrap();

    let first = db
        .add_message(conversation.id, MessageRole::User, "hello")
        .await
        .expect("Failed to add message");
    let second = db
        .add_message(conversation.id, MessageRole::Assistant, "hi there")
        .await
        .expect("Failed to add message");
    assert_eq!(first.conversation_id, conversation.id);
    assert_eq!(first.role, MessageRole::User);
    assert!(second.id > first.id);

    let fetched = db.get_conversation(conversation.id).await.unwrap().unwrap();
    assert_eq!(fetched.messages, vec![first, second.clone()]);
    assert!(fetched.updated_at >= conversation.updated_at);
    assert_eq!(fetched.updated_at, second.created_at);
}

#[tokio::test]
async fn test_database_add_message_to_missing_conversation() {
    let db = setup_test_db().await;
    let err = db
        .add_message(99, MessageRole::User, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(99)));
}

#[tokio::test]
async fn test_database_list_orders_by_last_update() {
    let db = setup_test_db().await;
    let older = db.create_conversation("older").await.unwrap();
    let newer = db.create_conversation("newer").await.unwrap();

    let listed = db.list_conversations().await.unwrap();
    assert_eq!(
        listed.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );

    db.add_message(older.id, MessageRole::User, "bump")
        .await
        .unwrap();
    let listed = db.list_conversations().await.unwrap();
    assert_eq!(listed[0].id, older.id);
    assert_eq!(listed[0].messages.len(), 1);
    assert!(listed[1].messages.is_empty());
}

#[tokio::test]
async fn test_database_delete_cascades_messages() {
    let db = setup_test_db().await;
    let conversation = db.create_conversation("doomed").await.unwrap();
    db.add_message(conversation.id, MessageRole::User, "bye")
        .await
        .unwrap();

    db.delete_conversation(conversation.id)
        .await
        .expect("Failed to delete conversation");
    assert!(db.get_conversation(conversation.id).await.unwrap().is_none());

    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    assert!(matches!(
        db.delete_conversation(conversation.id).await,
        Err(DbError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_database_migrate_is_idempotent() {
    let db = setup_test_db().await;
    db.migrate().await.expect("Second migration failed");
}
