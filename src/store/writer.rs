//! Wardrobe writer with duplicate suppression.
//!
//! Candidates are compared against the user's existing wardrobe AND
//! against items already written in the current batch, so reruns and
//! repeated products inside one job are both caught. Rules run in
//! priority order; the first hit wins and is recorded in the outcome.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StoreError;
use crate::normalize::imaging::normalize_image_url;
use crate::store::traits::{WardrobeItem, WardrobeStore};

const NAME_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Which rule flagged a candidate as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateRule {
    /// Same source email, order id and name.
    SourceIds,
    /// Same normalised product image URL.
    ImageUrl,
    /// Same brand with a near-identical name and compatible size.
    BrandAndName,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    pub written: usize,
    pub duplicates_skipped: usize,
    pub duplicates: Vec<(WardrobeItem, DuplicateRule)>,
}

pub struct WardrobeWriter {
    store: Arc<dyn WardrobeStore>,
    // Serializes the read-check-insert sequence across concurrent
    // per-email workers; a stale wardrobe snapshot would let the same
    // product in twice.
    write_lock: tokio::sync::Mutex<()>,
}

impl WardrobeWriter {
    pub fn new(store: Arc<dyn WardrobeStore>) -> Self {
        Self {
            store,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Insert the non-duplicate subset of `items` for `user_id`.
    pub async fn write(
        &self,
        user_id: &str,
        items: Vec<WardrobeItem>,
    ) -> Result<WriteOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut existing = self.store.items_for_user(user_id).await?;
        let mut outcome = WriteOutcome::default();

        for item in items {
            match find_duplicate(&existing, &item) {
                Some(rule) => {
                    debug!(name = %item.name, ?rule, "Skipping duplicate item");
                    outcome.duplicates_skipped += 1;
                    outcome.duplicates.push((item, rule));
                }
                None => {
                    self.store.insert_item(&item).await?;
                    outcome.written += 1;
                    // Catches repeats later in this same batch.
                    existing.push(item);
                }
            }
        }

        info!(
            user_id,
            written = outcome.written,
            duplicates = outcome.duplicates_skipped,
            "Wardrobe write complete"
        );
        Ok(outcome)
    }
}

/// First matching duplicate rule, in priority order.
pub fn find_duplicate(existing: &[WardrobeItem], candidate: &WardrobeItem) -> Option<DuplicateRule> {
    if !candidate.source_email_id.is_empty() && !candidate.source_order_id.is_empty() {
        let hit = existing.iter().any(|e| {
            e.source_email_id == candidate.source_email_id
                && e.source_order_id == candidate.source_order_id
                && e.name.eq_ignore_ascii_case(&candidate.name)
        });
        if hit {
            return Some(DuplicateRule::SourceIds);
        }
    }

    if !candidate.image_url.is_empty() {
        let candidate_image = normalize_image_url(&candidate.image_url);
        let hit = existing.iter().any(|e| {
            !e.image_url.is_empty() && normalize_image_url(&e.image_url) == candidate_image
        });
        if hit {
            return Some(DuplicateRule::ImageUrl);
        }
    }

    let hit = existing.iter().any(|e| {
        if !e.brand.eq_ignore_ascii_case(&candidate.brand) {
            return false;
        }
        let similar = names_similar(&e.name, &candidate.name);
        let size_compatible = e.size.is_empty()
            || candidate.size.is_empty()
            || e.size.eq_ignore_ascii_case(&candidate.size);
        similar && size_compatible
    });
    if hit {
        return Some(DuplicateRule::BrandAndName);
    }

    None
}

/// Case-insensitive containment, or token-set Jaccard above the threshold.
/// Jaccard only counts words longer than three characters so colour and
/// sizing filler does not dominate.
fn names_similar(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }
    jaccard(&a, &b) > NAME_SIMILARITY_THRESHOLD
}

fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> =
        a.split_whitespace().filter(|w| w.len() > 3).collect();
    let set_b: std::collections::HashSet<&str> =
        b.split_whitespace().filter(|w| w.len() > 3).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn item(name: &str, brand: &str, email_id: &str, order_id: &str, image: &str) -> WardrobeItem {
        WardrobeItem {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            brand: brand.into(),
            name: name.into(),
            category: "Uncategorized".into(),
            size: "L".into(),
            quantity: 1,
            price: String::new(),
            color_tag: "unknown".into(),
            color_hex: "#808080".into(),
            image_url: image.into(),
            source_email_id: email_id.into(),
            source_order_id: order_id.into(),
            retailer: "zara".into(),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn source_id_rule_needs_matching_name() {
        let existing = vec![item("OVERSHIRT", "Zara", "m1", "o1", "")];
        // Same order, different product: not a duplicate by rule 1.
        assert_eq!(
            find_duplicate(&existing, &item("JEANS", "Levi's", "m1", "o1", "")),
            None
        );
        assert_eq!(
            find_duplicate(&existing, &item("overshirt", "Zara", "m1", "o1", "")),
            Some(DuplicateRule::SourceIds)
        );
    }

    #[test]
    fn image_rule_compares_normalised_urls() {
        let existing = vec![item("A", "Zara", "", "", "https://cdn.x/a.jpg?ts=1")];
        assert_eq!(
            find_duplicate(
                &existing,
                &item("totally different name", "Other", "", "", "https://cdn.x/a.jpg?ts=2")
            ),
            Some(DuplicateRule::ImageUrl)
        );
    }

    #[test]
    fn brand_name_rule_requires_compatible_size() {
        let existing = vec![item("Slim Fit Casual Shirt Blue", "Roadster", "", "", "")];

        let mut same = item("Blue Slim Fit Casual Shirt", "roadster", "", "", "");
        same.size = "L".into();
        assert_eq!(find_duplicate(&existing, &same), Some(DuplicateRule::BrandAndName));

        let mut other_size = same.clone();
        other_size.size = "XL".into();
        assert_eq!(find_duplicate(&existing, &other_size), None);

        let other_brand = item("Blue Slim Fit Casual Shirt", "Nike", "", "", "");
        assert_eq!(find_duplicate(&existing, &other_brand), None);
    }

    #[test]
    fn duplicate_detection_is_commutative() {
        let a = item("OVERSHIRT WITH POCKETS", "Zara", "m1", "o1", "https://cdn.x/a.jpg");
        let b = item("OVERSHIRT WITH POCKETS", "Zara", "m1", "o1", "https://cdn.x/a.jpg?x=1");
        assert!(find_duplicate(std::slice::from_ref(&a), &b).is_some());
        assert!(find_duplicate(std::slice::from_ref(&b), &a).is_some());
    }

    struct MemStore {
        items: std::sync::Mutex<Vec<WardrobeItem>>,
    }

    #[async_trait::async_trait]
    impl WardrobeStore for MemStore {
        async fn insert_item(&self, item: &WardrobeItem) -> Result<(), StoreError> {
            self.items.lock().unwrap().push(item.clone());
            Ok(())
        }
        async fn items_for_user(&self, user_id: &str) -> Result<Vec<WardrobeItem>, StoreError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.user_id == user_id)
                .cloned()
                .collect())
        }
        async fn record_job(
            &self,
            _job: &crate::store::traits::JobRecord,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn update_job(
            &self,
            _id: Uuid,
            _state: &crate::store::traits::JobState,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_job(&self, id: Uuid) -> Result<crate::store::traits::JobRecord, StoreError> {
            Err(StoreError::NotFound {
                entity: "ingest_job".into(),
                id: id.to_string(),
            })
        }
        async fn recent_jobs(
            &self,
            _user_id: &str,
            _limit: u32,
        ) -> Result<Vec<crate::store::traits::JobRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn rerun_writes_nothing_and_skips_everything() {
        let store = Arc::new(MemStore {
            items: std::sync::Mutex::new(Vec::new()),
        });
        let writer = WardrobeWriter::new(Arc::clone(&store) as Arc<dyn WardrobeStore>);

        let batch = vec![
            item("OVERSHIRT WITH POCKETS", "Zara", "m1", "o1", "https://cdn.x/a.jpg"),
            item("STRAIGHT-LEG JEANS", "Zara", "m1", "o1", "https://cdn.x/b.jpg"),
        ];

        let first = writer.write("u1", batch.clone()).await.unwrap();
        assert_eq!(first.written, 2);
        assert_eq!(first.duplicates_skipped, 0);

        let second = writer.write("u1", batch).await.unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.duplicates_skipped, 2);
    }

    /// Store whose wardrobe read lags behind inserts, like a remote
    /// database under load.
    struct SlowReadStore {
        inner: MemStore,
    }

    #[async_trait::async_trait]
    impl WardrobeStore for SlowReadStore {
        async fn insert_item(&self, item: &WardrobeItem) -> Result<(), StoreError> {
            self.inner.insert_item(item).await
        }
        async fn items_for_user(&self, user_id: &str) -> Result<Vec<WardrobeItem>, StoreError> {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.inner.items_for_user(user_id).await
        }
        async fn record_job(
            &self,
            job: &crate::store::traits::JobRecord,
        ) -> Result<(), StoreError> {
            self.inner.record_job(job).await
        }
        async fn update_job(
            &self,
            id: Uuid,
            state: &crate::store::traits::JobState,
        ) -> Result<(), StoreError> {
            self.inner.update_job(id, state).await
        }
        async fn get_job(&self, id: Uuid) -> Result<crate::store::traits::JobRecord, StoreError> {
            self.inner.get_job(id).await
        }
        async fn recent_jobs(
            &self,
            user_id: &str,
            limit: u32,
        ) -> Result<Vec<crate::store::traits::JobRecord>, StoreError> {
            self.inner.recent_jobs(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn concurrent_writes_of_the_same_item_insert_once() {
        let store = Arc::new(SlowReadStore {
            inner: MemStore {
                items: std::sync::Mutex::new(Vec::new()),
            },
        });
        let writer = Arc::new(WardrobeWriter::new(
            Arc::clone(&store) as Arc<dyn WardrobeStore>
        ));

        let batch_a = vec![item("OVERSHIRT WITH POCKETS", "Zara", "m1", "o1", "https://cdn.x/a.jpg")];
        let batch_b = batch_a.clone();

        let (a, b) = tokio::join!(writer.write("u1", batch_a), writer.write("u1", batch_b));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.written + b.written, 1);
        assert_eq!(a.duplicates_skipped + b.duplicates_skipped, 1);
        assert_eq!(store.inner.items.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn in_batch_repeat_is_skipped() {
        let store = Arc::new(MemStore {
            items: std::sync::Mutex::new(Vec::new()),
        });
        let writer = WardrobeWriter::new(store as Arc<dyn WardrobeStore>);

        let twice = vec![
            item("PURL KNIT SWEATER", "Zara", "m1", "o1", "https://cdn.x/c.jpg"),
            item("PURL KNIT SWEATER", "Zara", "m1", "o1", "https://cdn.x/c.jpg?w=2"),
        ];
        let outcome = writer.write("u1", twice).await.unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.duplicates_skipped, 1);
        assert_eq!(outcome.duplicates[0].1, DuplicateRule::SourceIds);
    }
}
