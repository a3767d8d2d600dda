use sqlx::SqlitePool;

use crate::models::Item;

pub async fn fetch_items(db: &SqlitePool) -> Result<Vec<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(
        "SELECT id, title, content, completed, due_date FROM to_do_items"
    )
    .fetch_all(db)
    .await
}

pub async fn find_item_by_id(db: &SqlitePool, id: &str) -> Result<Option<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(
        "SELECT id, title, content, completed, due_date FROM to_do_items WHERE id = ?"
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Inserts the item, replacing every column of an existing row with the same id.
pub async fn upsert_item(db: &SqlitePool, item: &Item) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO to_do_items (id, title, content, completed, due_date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            completed = excluded.completed,
            due_date = excluded.due_date
        "#
    )
    .bind(&item.id)
    .bind(&item.title)
    .bind(&item.content)
    .bind(item.completed)
    .bind(item.due_date)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn update_item(db: &SqlitePool, item: &Item) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE to_do_items
        SET title = ?1,
            content = ?2,
            completed = ?3,
            due_date = ?4
        WHERE id = ?5
        "#
    )
    .bind(&item.title)
    .bind(&item.content)
    .bind(item.completed)
    .bind(item.due_date)
    .bind(&item.id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result)
}

pub async fn update_completed(
    db: &SqlitePool,
    id: &str,
    completed: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE to_do_items SET completed = ? WHERE id = ?")
        .bind(completed)
        .bind(id)
        .execute(db)
        .await?;

    Ok(())
}

pub async fn delete_item_by_id(db: &SqlitePool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM to_do_items WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result)
}

pub async fn delete_items(db: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM to_do_items").execute(db).await?;
    Ok(())
}

pub async fn delete_completed_items(db: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM to_do_items WHERE completed = 1")
        .execute(db)
        .await?
        .rows_affected();

    Ok(result)
}
