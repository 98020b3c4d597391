//! Irreversible reclamation of a deactivated account.

pub mod content;

pub use content::ContentRoot;

use crate::codec::keys::EXTERNAL_PREFIX;
use crate::codec::user_key;
use crate::identity::ExternalLink;
use crate::storage::KvStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a purge actually removed. Purging an already-purged handle yields an
/// all-empty report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub identity_removed: bool,
    pub links_removed: usize,
    pub content_removed: bool,
}

/// Deletes a user's identity record, external-identity links and content
/// directory. Never fails: every error is logged and swallowed because a
/// purge runs as a side effect of unrelated requests.
pub struct PurgeExecutor {
    store: Arc<dyn KvStore>,
    content: Option<ContentRoot>,
}

impl PurgeExecutor {
    pub fn new(store: Arc<dyn KvStore>, content: Option<ContentRoot>) -> Self {
        Self { store, content }
    }

    pub fn content(&self) -> Option<&ContentRoot> {
        self.content.as_ref()
    }

    pub async fn purge(&self, handle: &str) -> PurgeReport {
        let mut report = PurgeReport::default();

        match self.store.delete(&user_key(handle)).await {
            Ok(removed) => report.identity_removed = removed,
            Err(err) => warn!(handle, error = %err, "purge: failed to delete identity record"),
        }

        report.links_removed = self.remove_links(handle).await;

        if let Some(content) = &self.content {
            match content.remove(handle).await {
                Ok(removed) => report.content_removed = removed,
                Err(err) => warn!(
                    handle,
                    dir = %content.dir_for(handle).display(),
                    error = %err,
                    "purge: failed to remove content directory"
                ),
            }
        }

        info!(
            handle,
            identity_removed = report.identity_removed,
            links_removed = report.links_removed,
            content_removed = report.content_removed,
            "account purged"
        );
        report
    }

    async fn remove_links(&self, handle: &str) -> usize {
        let links = match self.store.scan_json::<ExternalLink>(EXTERNAL_PREFIX).await {
            Ok(links) => links,
            Err(err) => {
                warn!(handle, error = %err, "purge: failed to scan external links");
                return 0;
            }
        };
        let mut removed = 0;
        for (key, _) in links.into_iter().filter(|(_, link)| link.handle == handle) {
            match self.store.delete(&key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => warn!(handle, key = %key, error = %err, "purge: failed to delete external link"),
            }
        }
        removed
    }
}
