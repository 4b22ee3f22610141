//! Comment moderation: the submission gate and the moderator state machine.
//!
//! Both are pure decision logic. Persistence and CAPTCHA verification happen
//! at the call site; the gate receives the already-loaded parent comment and
//! the already-resolved CAPTCHA outcome.

use chrono::{DateTime, Utc};

use crate::models::{Comment, CommentStatus, NewComment, Settings};

pub const MAX_AUTHOR_NAME_LEN: usize = 100;
pub const MAX_AUTHOR_EMAIL_LEN: usize = 255;
pub const MAX_BODY_LEN: usize = 5000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GateError {
    #[error("comments are disabled")]
    CommentsDisabled,
    #[error("CAPTCHA verification required")]
    CaptchaRequired,
    #[error("{field}: {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },
    #[error("parent comment not found on this content item")]
    InvalidParent,
}

/// Decide whether a submission is admitted and with which initial status.
///
/// Checks run in a fixed order: feature toggle, CAPTCHA, field validation,
/// parent linkage. `parent` is the comment referenced by
/// `draft.parent_id`, loaded by the caller, or `None` when absent.
pub fn admit(
    draft: &NewComment,
    content_id: &str,
    parent: Option<&Comment>,
    settings: &Settings,
    captcha_verified: bool,
) -> Result<CommentStatus, GateError> {
    if !settings.comments_enabled {
        return Err(GateError::CommentsDisabled);
    }
    if settings.captcha_required && !captcha_verified {
        return Err(GateError::CaptchaRequired);
    }

    let name = draft.author_name.trim();
    if name.is_empty() {
        return Err(GateError::Validation { field: "author_name", reason: "must not be empty" });
    }
    if name.chars().count() > MAX_AUTHOR_NAME_LEN {
        return Err(GateError::Validation { field: "author_name", reason: "too long" });
    }

    let email = draft.author_email.trim();
    if email.is_empty() {
        return Err(GateError::Validation { field: "author_email", reason: "must not be empty" });
    }
    if email.chars().count() > MAX_AUTHOR_EMAIL_LEN {
        return Err(GateError::Validation { field: "author_email", reason: "too long" });
    }
    if !looks_like_email(email) {
        return Err(GateError::Validation { field: "author_email", reason: "invalid email format" });
    }

    let body = draft.body.trim();
    if body.is_empty() {
        return Err(GateError::Validation { field: "body", reason: "must not be empty" });
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(GateError::Validation { field: "body", reason: "too long" });
    }

    if draft.parent_id.is_some() {
        match parent {
            Some(p) if p.content_id == content_id => {}
            _ => return Err(GateError::InvalidParent),
        }
    }

    Ok(if settings.moderation_required {
        CommentStatus::Pending
    } else {
        CommentStatus::Approved
    })
}

// Shape check only; deliverability is not our problem.
fn looks_like_email(s: &str) -> bool {
    let Some(at) = s.find('@') else { return false };
    let (local, domain) = s.split_at(at);
    let domain = &domain[1..];
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Escape visitor-supplied text before persistence, mirroring what the
/// public renderer expects.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ModerationError {
    #[error("comment is already {0}")]
    InvalidTransition(CommentStatus),
}

/// Apply a moderator decision. Every directed pair of distinct statuses is
/// legal: moderation is corrective, not a forward-only pipeline. Only
/// `updated_at` changes besides the status itself; children are unaffected.
pub fn moderate(
    comment: &Comment,
    target: CommentStatus,
    now: DateTime<Utc>,
) -> Result<Comment, ModerationError> {
    if comment.status == target {
        return Err(ModerationError::InvalidTransition(target));
    }
    let mut next = comment.clone();
    next.status = target;
    next.updated_at = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> Settings {
        Settings::default()
    }

    fn draft() -> NewComment {
        NewComment {
            author_name: "Bob".into(),
            author_email: "bob@example.com".into(),
            body: "Nice article".into(),
            parent_id: None,
            captcha_token: None,
        }
    }

    fn comment(id: &str, content_id: &str) -> Comment {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Comment {
            id: id.into(),
            content_id: content_id.into(),
            parent_id: None,
            author_name: "Bob".into(),
            author_email: "bob@example.com".into(),
            body: "hi".into(),
            status: CommentStatus::Pending,
            created_at: t0,
            updated_at: t0,
        }
    }

    #[test]
    fn disabled_comments_reject_before_anything_else() {
        let mut s = settings();
        s.comments_enabled = false;
        // even a completely invalid draft gets the policy error first
        let bad = NewComment { author_name: String::new(), ..draft() };
        assert_eq!(
            admit(&bad, "c1", None, &s, false),
            Err(GateError::CommentsDisabled)
        );
    }

    #[test]
    fn captcha_gate_applies_before_validation() {
        let mut s = settings();
        s.captcha_required = true;
        assert_eq!(
            admit(&draft(), "c1", None, &s, false),
            Err(GateError::CaptchaRequired)
        );
        // once verified the submission proceeds to the normal outcome
        assert_eq!(
            admit(&draft(), "c1", None, &s, true),
            Ok(CommentStatus::Pending)
        );
    }

    #[test]
    fn moderation_toggle_selects_initial_status() {
        let mut s = settings();
        s.moderation_required = true;
        assert_eq!(admit(&draft(), "c1", None, &s, false), Ok(CommentStatus::Pending));
        s.moderation_required = false;
        assert_eq!(admit(&draft(), "c1", None, &s, false), Ok(CommentStatus::Approved));
    }

    #[test]
    fn field_validation() {
        let s = settings();
        let cases = [
            (NewComment { author_name: "  ".into(), ..draft() }, "author_name"),
            (NewComment { author_name: "x".repeat(101), ..draft() }, "author_name"),
            (NewComment { author_email: "not-an-email".into(), ..draft() }, "author_email"),
            (NewComment { author_email: format!("{}@e.com", "x".repeat(250)), ..draft() }, "author_email"),
            (NewComment { body: String::new(), ..draft() }, "body"),
            (NewComment { body: "x".repeat(5001), ..draft() }, "body"),
        ];
        for (bad, expect_field) in cases {
            match admit(&bad, "c1", None, &s, false) {
                Err(GateError::Validation { field, .. }) => assert_eq!(field, expect_field),
                other => panic!("expected validation error on {expect_field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parent_must_exist_and_match_content() {
        let s = settings();
        let reply = NewComment { parent_id: Some("p1".into()), ..draft() };

        // parent id given but nothing loaded
        assert_eq!(
            admit(&reply, "c1", None, &s, false),
            Err(GateError::InvalidParent)
        );
        // parent attached to a different content item
        let foreign = comment("p1", "c2");
        assert_eq!(
            admit(&reply, "c1", Some(&foreign), &s, false),
            Err(GateError::InvalidParent)
        );
        // same content item is fine
        let local = comment("p1", "c1");
        assert_eq!(
            admit(&reply, "c1", Some(&local), &s, false),
            Ok(CommentStatus::Pending)
        );
    }

    #[test]
    fn sanitize_escapes_markup() {
        assert_eq!(
            sanitize("  <b>\"hi\" & 'bye'</b> "),
            "&lt;b&gt;&quot;hi&quot; &amp; &#x27;bye&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn all_distinct_moderation_pairs_are_legal() {
        let statuses = [
            CommentStatus::Pending,
            CommentStatus::Approved,
            CommentStatus::Rejected,
            CommentStatus::Spam,
        ];
        for from in statuses {
            for to in statuses {
                let mut c = comment("x", "c1");
                c.status = from;
                let res = moderate(&c, to, Utc::now());
                assert_eq!(res.is_ok(), from != to, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn spam_to_approved_is_a_direct_reversal() {
        let mut c = comment("x", "c1");
        c.status = CommentStatus::Spam;
        let approved = moderate(&c, CommentStatus::Approved, Utc::now()).unwrap();
        assert_eq!(approved.status, CommentStatus::Approved);
    }

    #[test]
    fn moderation_touches_only_status_and_updated_at() {
        let c = comment("x", "c1");
        let later = c.created_at + chrono::Duration::hours(1);
        let next = moderate(&c, CommentStatus::Approved, later).unwrap();
        assert_eq!(next.body, c.body);
        assert_eq!(next.created_at, c.created_at);
        assert_eq!(next.updated_at, later);
    }
}
