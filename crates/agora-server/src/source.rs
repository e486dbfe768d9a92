//! The store as a [`MessageSource`] for feed drivers.

use std::sync::{Arc, Mutex};

use agora_feed::{MessageSource, PageRequest};
use agora_shared::{FeedError, Page};
use agora_store::Database;

#[derive(Clone)]
pub struct StoreSource {
    db: Arc<Mutex<Database>>,
}

impl StoreSource {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl MessageSource for StoreSource {
    fn list_messages(&self, request: &PageRequest) -> Result<Page, FeedError> {
        let db = self
            .db
            .lock()
            .map_err(|_| FeedError::TransientFetchFailure("database lock poisoned".into()))?;
        db.list_messages(&request.scope, request.before.as_ref(), request.limit)
            .map_err(FeedError::from)
    }
}
