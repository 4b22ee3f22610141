//! Content publication lifecycle engine.
//!
//! Pure transition logic: no persistence, no clock reads. Callers load the
//! item, transition it here, and persist the result.

use chrono::{DateTime, Utc};

use crate::models::{ContentItem, ContentStatus};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    /// Target equals the current status. Rejected so callers must detect
    /// redundant calls instead of silently re-writing.
    #[error("content is already {0}")]
    InvalidTransition(ContentStatus),
}

/// Apply a manual status transition. All six cross-status pairs are legal.
///
/// First entry into published stamps `published_at`; re-entries leave it
/// untouched. Leaving draft, or any (re)publication, clears `scheduled_at`:
/// a manual transition always supersedes a pending scheduled publish.
pub fn transition(
    item: &ContentItem,
    target: ContentStatus,
    now: DateTime<Utc>,
) -> Result<ContentItem, LifecycleError> {
    if item.status == target {
        return Err(LifecycleError::InvalidTransition(target));
    }
    let mut next = item.clone();
    next.status = target;
    next.updated_at = now;
    if target == ContentStatus::Published && next.published_at.is_none() {
        next.published_at = Some(now);
    }
    if item.status == ContentStatus::Draft || target == ContentStatus::Published {
        next.scheduled_at = None;
    }
    Ok(next)
}

/// Scheduler variant of draft -> published. Unlike a manual transition the
/// schedule timestamp is kept on the record as inert history, matching what
/// moderators see in the admin panel after an automatic publish.
pub fn publish_scheduled(
    item: &ContentItem,
    now: DateTime<Utc>,
) -> Result<ContentItem, LifecycleError> {
    let mut next = transition(item, ContentStatus::Published, now)?;
    next.scheduled_at = item.scheduled_at;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn draft_item() -> ContentItem {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ContentItem {
            id: "c1".into(),
            content_type: crate::models::ContentType::Post,
            title: "Hello".into(),
            slug: "hello".into(),
            body: "body".into(),
            excerpt: String::new(),
            author: "alice".into(),
            status: ContentStatus::Draft,
            featured_image: None,
            metadata: json!({}),
            created_at: t0,
            updated_at: t0,
            published_at: None,
            scheduled_at: None,
        }
    }

    #[test]
    fn same_status_is_rejected() {
        let item = draft_item();
        let err = transition(&item, ContentStatus::Draft, Utc::now()).unwrap_err();
        assert_eq!(err, LifecycleError::InvalidTransition(ContentStatus::Draft));
    }

    #[test]
    fn all_cross_status_pairs_are_legal() {
        let statuses = [
            ContentStatus::Draft,
            ContentStatus::Published,
            ContentStatus::Archived,
        ];
        for from in statuses {
            for to in statuses {
                let mut item = draft_item();
                item.status = from;
                let res = transition(&item, to, Utc::now());
                assert_eq!(res.is_ok(), from != to, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn published_at_is_stamped_once_and_never_moves() {
        let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let t2 = t1 + Duration::days(1);
        let t3 = t2 + Duration::days(1);

        let item = draft_item();
        let published = transition(&item, ContentStatus::Published, t1).unwrap();
        assert_eq!(published.published_at, Some(t1));

        // unpublish back to draft keeps the original timestamp
        let unpublished = transition(&published, ContentStatus::Draft, t2).unwrap();
        assert_eq!(unpublished.published_at, Some(t1));

        let republished = transition(&unpublished, ContentStatus::Published, t3).unwrap();
        assert_eq!(republished.published_at, Some(t1));
        assert_eq!(republished.updated_at, t3);
    }

    #[test]
    fn manual_transition_clears_pending_schedule() {
        let mut item = draft_item();
        item.scheduled_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

        let archived = transition(&item, ContentStatus::Archived, Utc::now()).unwrap();
        assert_eq!(archived.scheduled_at, None);

        let published = transition(&item, ContentStatus::Published, Utc::now()).unwrap();
        assert_eq!(published.scheduled_at, None);
    }

    #[test]
    fn republication_supersedes_schedule() {
        let mut item = draft_item();
        item.status = ContentStatus::Archived;
        item.published_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        item.scheduled_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let republished = transition(&item, ContentStatus::Published, Utc::now()).unwrap();
        assert_eq!(republished.scheduled_at, None);
    }

    #[test]
    fn scheduled_publish_keeps_schedule_as_history() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut item = draft_item();
        item.scheduled_at = Some(at - Duration::seconds(1));

        let published = publish_scheduled(&item, at).unwrap();
        assert_eq!(published.status, ContentStatus::Published);
        assert_eq!(published.published_at, Some(at));
        assert_eq!(published.scheduled_at, item.scheduled_at);
    }

    #[test]
    fn scheduled_publish_of_published_item_is_invalid() {
        let mut item = draft_item();
        item.status = ContentStatus::Published;
        let err = publish_scheduled(&item, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition(ContentStatus::Published)
        );
    }

    #[test]
    fn engine_never_touches_content_fields() {
        let item = draft_item();
        let next = transition(&item, ContentStatus::Published, Utc::now()).unwrap();
        assert_eq!(next.title, item.title);
        assert_eq!(next.body, item.body);
        assert_eq!(next.metadata, item.metadata);
    }
}
