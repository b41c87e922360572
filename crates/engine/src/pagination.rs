use crate::resolver::decode_documents;
use domain::protocol::sort_value;
use domain::{CommentNode, PageCursor, Result, SortKey};
use std::sync::Arc;
use storage::{DocumentStore, Query};
use tracing::debug;

pub const PAGE_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct Page {
    pub nodes: Vec<CommentNode>,
    /// Where the next page starts. Equal to the input cursor when the page
    /// came back empty.
    pub cursor: Option<PageCursor>,
    pub fetched: usize,
}

pub async fn fetch_page(
    store: &dyn DocumentStore,
    sort: SortKey,
    cursor: Option<&PageCursor>,
    page_size: usize,
) -> Result<Page> {
    let documents = store
        .query(&Query::top_level(sort, cursor.cloned(), page_size))
        .await?;
    let fetched = documents.len();

    // the cursor follows the last document returned, even when it fails to
    // decode, so a bad document cannot pin the next page in place
    let next = match documents.last() {
        Some(last) => Some(PageCursor {
            key: sort_value(sort, &last.data),
            id: last.address.target().clone(),
        }),
        None => cursor.cloned(),
    };

    let nodes = decode_documents(documents)
        .into_iter()
        .map(|(_, node)| node)
        .collect();
    Ok(Page {
        nodes,
        cursor: next,
        fetched,
    })
}

pub struct PaginationCursor {
    store: Arc<dyn DocumentStore>,
    sort: SortKey,
    cursor: Option<PageCursor>,
    exhausted: bool,
}

impl PaginationCursor {
    pub fn new(store: Arc<dyn DocumentStore>, sort: SortKey) -> Self {
        Self {
            store,
            sort,
            cursor: None,
            exhausted: false,
        }
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    /// True once a page came back shorter than [`PAGE_SIZE`].
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn reset(&mut self, sort: SortKey) {
        self.sort = sort;
        self.cursor = None;
        self.exhausted = false;
    }

    /// Fetches the page after the current cursor without moving it.
    pub async fn fetch_next(&self) -> Result<Page> {
        let page = fetch_page(self.store.as_ref(), self.sort, self.cursor.as_ref(), PAGE_SIZE).await?;
        debug!(
            "Fetched {} {} comments after {:?}",
            page.fetched,
            self.sort,
            self.cursor.as_ref().map(ToString::to_string)
        );
        Ok(page)
    }

    pub fn commit(&mut self, cursor: Option<PageCursor>, fetched: usize) {
        self.exhausted = fetched < PAGE_SIZE;
        self.cursor = cursor;
    }

    pub async fn next_page(&mut self) -> Result<Vec<CommentNode>> {
        let Page {
            nodes,
            cursor,
            fetched,
        } = self.fetch_next().await?;
        self.commit(cursor, fetched);
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed;
    use domain::{Address, Reactions, THUMBS_UP};
    use std::collections::HashSet;
    use storage::MemoryStore;

    #[tokio::test]
    async fn eleven_comments_page_as_eight_then_three() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..11 {
            seed(&store, None, &format!("c{}", i)).await;
        }
        let mut pages = PaginationCursor::new(store.clone(), SortKey::Latest);

        let first = pages.next_page().await.unwrap();
        assert_eq!(first.len(), 8);
        assert!(!pages.is_exhausted());
        for pair in first.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }

        let second = pages.next_page().await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(pages.is_exhausted());

        let seen: HashSet<_> = first.iter().chain(&second).map(|n| n.id.clone()).collect();
        assert_eq!(seen.len(), 11);
    }

    #[tokio::test]
    async fn empty_page_keeps_the_cursor() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..8 {
            seed(&store, None, &format!("c{}", i)).await;
        }
        let mut pages = PaginationCursor::new(store.clone(), SortKey::Latest);
        pages.next_page().await.unwrap();
        let after_first = pages.cursor().cloned();

        assert!(pages.next_page().await.unwrap().is_empty());
        assert_eq!(pages.cursor().cloned(), after_first);
        assert!(pages.is_exhausted());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cursor_alone() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..9 {
            seed(&store, None, &format!("c{}", i)).await;
        }
        let mut pages = PaginationCursor::new(store.clone(), SortKey::Latest);
        pages.next_page().await.unwrap();
        let before = pages.cursor().cloned();

        store.fail_next(1);
        assert!(pages.next_page().await.is_err());
        assert_eq!(pages.cursor().cloned(), before);
        assert_eq!(pages.next_page().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uncommitted_fetch_can_be_repeated() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..10 {
            seed(&store, None, &format!("c{}", i)).await;
        }
        let mut pages = PaginationCursor::new(store.clone(), SortKey::Latest);
        let first = pages.fetch_next().await.unwrap();
        let again = pages.fetch_next().await.unwrap();
        assert_eq!(first.nodes, again.nodes);
        assert!(pages.cursor().is_none());

        pages.commit(again.cursor, again.fetched);
        assert_eq!(pages.next_page().await.unwrap().len(), 2);
        assert!(pages.is_exhausted());
    }

    #[tokio::test]
    async fn popular_order_breaks_ties_by_id() {
        let store = Arc::new(MemoryStore::new());
        let mut addresses: Vec<Address> = Vec::new();
        for i in 0..10 {
            addresses.push(seed(&store, None, &format!("c{}", i)).await);
        }
        let mut likes = Reactions::new();
        likes.set(THUMBS_UP, 5);
        store.set_reactions(&addresses[3], &likes).await.unwrap();

        let mut pages = PaginationCursor::new(store.clone(), SortKey::Popular);
        let first = pages.next_page().await.unwrap();
        let second = pages.next_page().await.unwrap();

        assert_eq!(&first[0].id, addresses[3].target());
        let rest: Vec<_> = first[1..].iter().chain(&second).map(|n| n.id.clone()).collect();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted);
        assert_eq!(rest.len(), 9);
    }

    #[tokio::test]
    async fn malformed_tail_still_advances_the_cursor() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, None, "good").await;
        // sorts after every stamped document under latest
        store.insert_raw("comments/zz".parse().unwrap(), serde_json::json!({"bogus": true}));

        let page = fetch_page(store.as_ref(), SortKey::Latest, None, PAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(page.fetched, 2);
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.cursor.unwrap().id.as_str(), "zz");
    }
}
