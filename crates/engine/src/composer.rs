use crate::collaborators::{Attachment, BlobStore, IdentityProvider};
use crate::tree::TreeStore;
use anyhow::anyhow;
use domain::protocol::{build_node_document, decode_node, plain_text_len, MAX_PLAIN_TEXT_CHARS};
use domain::{Author, CommentNode, Error, Result, SortKey};
use std::sync::Arc;
use storage::DocumentStore;
use tracing::{error, info};

pub fn ensure_within_limit(content_html: &str) -> Result<()> {
    let len = plain_text_len(content_html);
    if len > MAX_PLAIN_TEXT_CHARS {
        return Err(Error::ContentTooLong {
            len,
            limit: MAX_PLAIN_TEXT_CHARS,
        });
    }
    Ok(())
}

pub struct CommentComposer {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    blobs: Arc<dyn BlobStore>,
}

impl CommentComposer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            identity,
            blobs,
        }
    }

    pub async fn post(
        &self,
        tree: &mut TreeStore,
        content_html: &str,
        attachments: Vec<Attachment>,
    ) -> Result<CommentNode> {
        let user = self.identity.current_user().ok_or(Error::Unauthenticated)?;
        ensure_within_limit(content_html)?;

        let mut urls = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match attachment {
                Attachment::Url(url) => urls.push(url),
                Attachment::File(file) => {
                    let url = self.blobs.upload(&file).await.map_err(|e| {
                        error!("Upload of {} failed: {:?}", file.name, e);
                        Error::TransportFailure(e)
                    })?;
                    urls.push(url);
                }
            }
        }

        let author = Author::from(&user);
        let data = build_node_document(&author, content_html, &urls);
        let created = self
            .store
            .create(None, data)
            .await?
            .ok_or_else(|| Error::TransportFailure(anyhow!("store refused a top-level comment")))?;
        let node = decode_node(&created)
            .map_err(|e| Error::TransportFailure(anyhow!("store returned {}", e)))?;

        info!("{} posted {} ({} attachments)", user.uid, created.address, urls.len());
        if tree.sort() == SortKey::Latest {
            tree.merge(vec![node.clone()]);
        }
        Ok(node)
    }
}
