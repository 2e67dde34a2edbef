//! Fan-out over every configured provider.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::info::{LookupInfo, SourceKind};
use crate::lookup::{LookupError, PhoneLookup};
use crate::number::{sanitize_for_log, CanonicalNumber};

/// Combines providers into one source of [`LookupInfo`].
#[derive(Clone, Default)]
pub struct CompositeLookup {
    lookups: Vec<Arc<dyn PhoneLookup>>,
}

impl std::fmt::Debug for CompositeLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLookup")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl CompositeLookup {
    #[must_use]
    pub fn new(lookups: Vec<Arc<dyn PhoneLookup>>) -> Self {
        Self { lookups }
    }

    /// Adds a provider.
    #[must_use]
    pub fn with(mut self, lookup: Arc<dyn PhoneLookup>) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Source kinds covered, in registration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SourceKind> {
        self.lookups.iter().map(|l| l.kind()).collect()
    }

    /// True as soon as any provider reports dirty; the rest are not awaited.
    pub async fn is_dirty(&self, numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        let mut pending: FuturesUnordered<_> = self
            .lookups
            .iter()
            .map(|lookup| async move { (lookup.kind(), lookup.is_dirty(numbers).await) })
            .collect();

        while let Some((kind, result)) = pending.next().await {
            if result? {
                tracing::debug!(source = %kind, "lookup reports dirty");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Builds fresh info for every key of `existing`.
    ///
    /// Each number's info is assembled from scratch out of every provider's
    /// answer, so the result has exactly the keys of `existing`.
    pub async fn bulk_update(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, LookupInfo>, LookupError> {
        let answers = try_join_all(
            self.lookups
                .iter()
                .map(|lookup| lookup.most_recent_info(existing)),
        )
        .await?;

        let mut merged = HashMap::with_capacity(existing.len());
        for number in existing.keys() {
            let mut info = LookupInfo::default();
            for (lookup, answer) in self.lookups.iter().zip(&answers) {
                let kind = lookup.kind();
                let record = answer.get(number).ok_or_else(|| LookupError::MissingResult {
                    source_name: kind.as_str().to_string(),
                    number: sanitize_for_log(&number.normalized()),
                })?;
                if record.kind() != kind {
                    return Err(LookupError::WrongSourceKind {
                        source_name: kind.as_str().to_string(),
                        expected: kind,
                        actual: record.kind(),
                    });
                }
                info.set(record.clone());
            }
            merged.insert(number.clone(), info);
        }
        Ok(merged)
    }

    pub async fn on_successful_bulk_update(&self) -> Result<(), LookupError> {
        try_join_all(self.lookups.iter().map(|l| l.on_successful_bulk_update())).await?;
        Ok(())
    }

    pub async fn clear_data(&self) -> Result<(), LookupError> {
        try_join_all(self.lookups.iter().map(|l| l.clear_data())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::info::{CnapInfo, SpamInfo, SubRecord};

    struct Scripted {
        kind: SourceKind,
        dirty: bool,
        record: Option<SubRecord>,
    }

    impl Scripted {
        fn new(kind: SourceKind, dirty: bool, record: Option<SubRecord>) -> Arc<dyn PhoneLookup> {
            Arc::new(Self { kind, dirty, record })
        }
    }

    #[async_trait]
    impl PhoneLookup for Scripted {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn is_dirty(&self, _: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
            Ok(self.dirty)
        }

        async fn most_recent_info(
            &self,
            existing: &HashMap<CanonicalNumber, LookupInfo>,
        ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
            Ok(match &self.record {
                Some(record) => existing.keys().map(|n| (n.clone(), record.clone())).collect(),
                None => HashMap::new(),
            })
        }
    }

    fn existing() -> HashMap<CanonicalNumber, LookupInfo> {
        [(CanonicalNumber::parse("+14085550101", "US"), LookupInfo::default())].into()
    }

    #[tokio::test]
    async fn dirty_if_any_lookup_is_dirty() {
        let clean = Scripted::new(SourceKind::Cnap, false, None);
        let dirty = Scripted::new(SourceKind::Spam, true, None);
        let composite = CompositeLookup::new(vec![clean.clone(), dirty]);
        assert!(composite.is_dirty(&HashSet::new()).await.unwrap());

        let composite = CompositeLookup::new(vec![clean]);
        assert!(!composite.is_dirty(&HashSet::new()).await.unwrap());
    }

    #[tokio::test]
    async fn bulk_update_assembles_every_source() {
        let composite = CompositeLookup::default()
            .with(Scripted::new(
                SourceKind::Cnap,
                false,
                Some(SubRecord::Cnap(CnapInfo { name: "ACME".into() })),
            ))
            .with(Scripted::new(
                SourceKind::Spam,
                false,
                Some(SubRecord::Spam(SpamInfo { is_spam: true })),
            ));

        let existing = existing();
        let updated = composite.bulk_update(&existing).await.unwrap();
        assert_eq!(updated.len(), 1);
        let info = updated.values().next().unwrap();
        assert_eq!(info.cnap.as_ref().map(|c| c.name.as_str()), Some("ACME"));
        assert!(info.spam.is_spam);
        assert!(info.default_directory.is_none());
    }

    #[tokio::test]
    async fn missing_answer_is_an_error() {
        let composite = CompositeLookup::new(vec![Scripted::new(SourceKind::Cnap, false, None)]);
        let err = composite.bulk_update(&existing()).await.unwrap_err();
        assert!(matches!(err, LookupError::MissingResult { .. }));
    }

    #[tokio::test]
    async fn answer_for_wrong_kind_is_an_error() {
        let composite = CompositeLookup::new(vec![Scripted::new(
            SourceKind::CallerId,
            false,
            Some(SubRecord::Cnap(CnapInfo::default())),
        )]);
        let err = composite.bulk_update(&existing()).await.unwrap_err();
        assert!(matches!(
            err,
            LookupError::WrongSourceKind {
                expected: SourceKind::CallerId,
                actual: SourceKind::Cnap,
                ..
            }
        ));
    }
}
