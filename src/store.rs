use crate::error::StoreError;
use crate::types::Subscription;
use std::collections::HashMap;
use std::path::PathBuf;

const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";

/// Durable per-trigger subscription state, persisted in the host data dir.
///
/// This is the only place the remote id and secret live. Lifecycle code gets it
/// passed in explicitly; the HTTP server only ever sees a read-only snapshot.
pub struct SubscriptionStore {
    subscriptions: HashMap<String, Subscription>,
    data_dir: PathBuf,
}

impl SubscriptionStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            subscriptions: HashMap::new(),
            data_dir,
        }
    }

    fn path(&self) -> PathBuf {
        self.data_dir.join(SUBSCRIPTIONS_FILE)
    }

    pub fn load(&mut self) -> Result<(), StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let items: Vec<Subscription> = serde_json::from_str(&content)?;
        for sub in items {
            self.subscriptions.insert(sub.trigger_id.clone(), sub);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.path();
        let io_err = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.data_dir).map_err(io_err)?;
        let content = serde_json::to_string_pretty(&self.list())?;
        std::fs::write(&path, content).map_err(io_err)
    }

    pub fn get(&self, trigger_id: &str) -> Option<&Subscription> {
        self.subscriptions.get(trigger_id)
    }

    /// Insert or replace the record for `sub.trigger_id`.
    pub fn set(&mut self, sub: Subscription) {
        self.subscriptions.insert(sub.trigger_id.clone(), sub);
    }

    pub fn delete(&mut self, trigger_id: &str) -> Option<Subscription> {
        self.subscriptions.remove(trigger_id)
    }

    pub fn list(&self) -> Vec<&Subscription> {
        let mut items: Vec<&Subscription> = self.subscriptions.values().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Point every stored target URL at the server's current public address.
    pub fn rebase_target_urls(&mut self, public_url: &str) {
        for (id, sub) in self.subscriptions.iter_mut() {
            sub.target_url = target_url(public_url, id);
        }
    }

    /// Cloned snapshot handed to the HTTP server.
    pub fn snapshot(&self) -> HashMap<String, Subscription> {
        self.subscriptions.clone()
    }
}

pub fn target_url(public_url: &str, trigger_id: &str) -> String {
    format!("{}/hooks/{trigger_id}", public_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventFilter;

    fn sub(id: &str) -> Subscription {
        Subscription::new(id, target_url("http://127.0.0.1:1", id), EventFilter::Any)
    }

    #[test]
    fn test_get_set_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SubscriptionStore::new(dir.path().to_path_buf());
        assert!(store.get("t1").is_none());

        store.set(sub("t1"));
        assert_eq!(store.get("t1").unwrap().trigger_id, "t1");
        assert_eq!(store.len(), 1);

        let removed = store.delete("t1").unwrap();
        assert_eq!(removed.trigger_id, "t1");
        assert!(store.get("t1").is_none());
        assert!(store.delete("t1").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SubscriptionStore::new(dir.path().to_path_buf());
        let mut s = sub("t1");
        s.remote_id = Some("wh_123".into());
        s.secret = Some("s3cr3t".into());
        s.event_filter = EventFilter::Named("JOB_FAILED".into());
        store.set(s);
        store.set(sub("t2"));
        store.save().unwrap();

        let mut reloaded = SubscriptionStore::new(dir.path().to_path_buf());
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        let t1 = reloaded.get("t1").unwrap();
        assert_eq!(t1.remote_id.as_deref(), Some("wh_123"));
        assert_eq!(t1.secret.as_deref(), Some("s3cr3t"));
        assert_eq!(t1.event_filter, EventFilter::Named("JOB_FAILED".into()));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SubscriptionStore::new(dir.path().join("nested"));
        store.load().unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SUBSCRIPTIONS_FILE), "{not json").unwrap();
        let mut store = SubscriptionStore::new(dir.path().to_path_buf());
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_rebase_target_urls() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SubscriptionStore::new(dir.path().to_path_buf());
        store.set(sub("t1"));
        store.rebase_target_urls("https://hooks.example.com/");
        assert_eq!(
            store.get("t1").unwrap().target_url,
            "https://hooks.example.com/hooks/t1"
        );
    }
}
