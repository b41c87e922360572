use crate::models::{into_documents, SqlDocument};
use crate::store::{collection_of, generate_id, DocumentStore, Query};
use crate::Db;
use async_trait::async_trait;
use domain::protocol::{read_reactions, thumbs_up, write_reactions, write_timestamp, Document};
use domain::{Address, ChangeNotice, NodeId, Reactions, SortKey};
use serde_json::Value;
use sqlx::SqliteConnection;
use tokio::sync::broadcast;

impl Db {
    async fn load_data(conn: &mut SqliteConnection, address: &Address) -> anyhow::Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM documents WHERE path = ?")
            .bind(address.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|(data,)| serde_json::from_str(&data).unwrap_or(Value::Null)))
    }

    async fn store_reactions(
        conn: &mut SqliteConnection,
        address: &Address,
        mut data: Value,
        reactions: &Reactions,
    ) -> anyhow::Result<()> {
        write_reactions(&mut data, reactions);
        sqlx::query("UPDATE documents SET data = ?, thumbs_up = ? WHERE path = ?")
            .bind(data.to_string())
            .bind(thumbs_up(&data))
            .bind(address.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn increment_in(
        conn: &mut SqliteConnection,
        address: &Address,
        emoji: &str,
    ) -> anyhow::Result<Option<Reactions>> {
        let Some(data) = Self::load_data(conn, address).await? else {
            return Ok(None);
        };
        let mut reactions = read_reactions(&data);
        reactions.increment(emoji);
        Self::store_reactions(conn, address, data, &reactions).await?;
        Ok(Some(reactions))
    }
}

#[async_trait]
impl DocumentStore for Db {
    async fn query(&self, query: &Query) -> anyhow::Result<Vec<Document>> {
        let key = match query.order {
            SortKey::Latest => "created_at",
            SortKey::Popular => "thumbs_up",
        };
        // sqlite treats a negative LIMIT as "no limit"
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);

        let rows = match &query.after {
            None => {
                let sql = format!(
                    "SELECT path, data FROM documents WHERE collection = ? \
                     ORDER BY {key} DESC, id ASC LIMIT ?"
                );
                sqlx::query_as::<_, SqlDocument>(&sql)
                    .bind(query.collection_path())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(cursor) => {
                let sql = format!(
                    "SELECT path, data FROM documents WHERE collection = ? \
                     AND ({key} < ? OR ({key} = ? AND id > ?)) \
                     ORDER BY {key} DESC, id ASC LIMIT ?"
                );
                sqlx::query_as::<_, SqlDocument>(&sql)
                    .bind(query.collection_path())
                    .bind(cursor.key)
                    .bind(cursor.key)
                    .bind(cursor.id.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(into_documents(rows))
    }

    async fn get(&self, address: &Address) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query_as::<_, SqlDocument>("SELECT path, data FROM documents WHERE path = ?")
            .bind(address.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(into_documents(row.into_iter().collect()).pop())
    }

    async fn create(
        &self,
        parent: Option<&Address>,
        mut data: Value,
    ) -> anyhow::Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        if let Some(parent) = parent {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM documents WHERE path = ?")
                .bind(parent.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Ok(None);
            }
        }

        let id = NodeId::new_unchecked(generate_id());
        let address = match parent {
            Some(parent) => parent.child(id.clone()),
            None => Address::top_level(id.clone()),
        };
        let at = self.clock.next();
        write_timestamp(&mut data, at);

        sqlx::query(
            r#"
            INSERT INTO documents (path, collection, id, created_at, thumbs_up, data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(address.to_string())
        .bind(collection_of(&address))
        .bind(id.as_str())
        .bind(at.timestamp_micros())
        .bind(thumbs_up(&data))
        .bind(data.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.feed.publish(address.clone());
        Ok(Some(Document { address, data }))
    }

    async fn set_reactions(
        &self,
        address: &Address,
        reactions: &Reactions,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(data) = Self::load_data(&mut *tx, address).await? else {
            return Ok(false);
        };
        Self::store_reactions(&mut *tx, address, data, reactions).await?;
        tx.commit().await?;
        self.feed.publish(address.clone());
        Ok(true)
    }

    async fn increment_reaction(
        &self,
        address: &Address,
        emoji: &str,
    ) -> anyhow::Result<Option<Reactions>> {
        let mut conn = self.pool.acquire().await?;
        // take the write lock before reading so no other writer slips in
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        let result = Self::increment_in(&mut *conn, address, emoji).await;
        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(end).execute(&mut *conn).await?;

        let reactions = result?;
        if reactions.is_some() {
            self.feed.publish(address.clone());
        }
        Ok(reactions)
    }

    fn version(&self) -> u64 {
        self.feed.version()
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::protocol::{build_node_document, read_timestamp};
    use domain::{Author, PageCursor, THUMBS_UP};

    async fn db() -> Db {
        Db::new("sqlite::memory:").await.unwrap()
    }

    fn doc(text: &str) -> Value {
        build_node_document(&Author::default(), text, &[])
    }

    #[tokio::test]
    async fn nested_documents_live_one_level_below_their_parent() {
        let db = db().await;
        let top = db.create(None, doc("top")).await.unwrap().unwrap();
        let reply = db.create(Some(&top.address), doc("r")).await.unwrap().unwrap();
        let nested = db.create(Some(&reply.address), doc("n")).await.unwrap().unwrap();

        assert_eq!(nested.address.depth(), 2);
        assert_eq!(
            db.query(&Query::replies_of(reply.address.clone())).await.unwrap(),
            vec![nested.clone()]
        );
        let roots = db.query(&Query::top_level(SortKey::Latest, None, 8)).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(db.get(&nested.address).await.unwrap(), Some(nested));
    }

    #[tokio::test]
    async fn create_under_missing_parent_is_none() {
        let db = db().await;
        let ghost: Address = "comments/ghost".parse().unwrap();
        assert!(db.create(Some(&ghost), doc("x")).await.unwrap().is_none());
        assert_eq!(db.version(), 0);
    }

    #[tokio::test]
    async fn latest_pages_are_newest_first_and_disjoint() {
        let db = db().await;
        for i in 0..11 {
            db.create(None, doc(&format!("c{}", i))).await.unwrap();
        }
        let first = db.query(&Query::top_level(SortKey::Latest, None, 8)).await.unwrap();
        assert_eq!(first.len(), 8);
        for pair in first.windows(2) {
            assert!(read_timestamp(&pair[0].data) > read_timestamp(&pair[1].data));
        }

        let last = first.last().unwrap();
        let cursor = PageCursor {
            key: read_timestamp(&last.data).unwrap().timestamp_micros(),
            id: last.address.target().clone(),
        };
        let second = db
            .query(&Query::top_level(SortKey::Latest, Some(cursor), 8))
            .await
            .unwrap();
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|d| !first.contains(d)));
    }

    #[tokio::test]
    async fn reactions_update_the_popular_index() {
        let db = db().await;
        let a = db.create(None, doc("a")).await.unwrap().unwrap();
        let b = db.create(None, doc("b")).await.unwrap().unwrap();

        let mut reactions = Reactions::new();
        reactions.set(THUMBS_UP, 3);
        assert!(db.set_reactions(&a.address, &reactions).await.unwrap());
        let bumped = db.increment_reaction(&b.address, THUMBS_UP).await.unwrap().unwrap();
        assert_eq!(bumped.get(THUMBS_UP), 1);

        let popular = db.query(&Query::top_level(SortKey::Popular, None, 8)).await.unwrap();
        let ids: Vec<_> = popular.iter().map(|d| d.address.clone()).collect();
        assert_eq!(ids, vec![a.address, b.address]);
    }

    #[tokio::test]
    async fn reacting_to_missing_document_changes_nothing() {
        let db = db().await;
        let ghost: Address = "comments/ghost".parse().unwrap();
        assert!(!db.set_reactions(&ghost, &Reactions::new()).await.unwrap());
        assert!(db.increment_reaction(&ghost, "🔥").await.unwrap().is_none());
        assert_eq!(db.version(), 0);
    }

    #[tokio::test]
    async fn malformed_rows_reach_the_caller_as_null() {
        let db = db().await;
        sqlx::query(
            "INSERT INTO documents (path, collection, id, created_at, thumbs_up, data) \
             VALUES ('comments/bad', 'comments', 'bad', 1, 0, '{not json')",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        let got = db.get(&"comments/bad".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(got.data, Value::Null);
    }
}
