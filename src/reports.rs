//! Administrative report forms.
//!
//! All five report kinds run through one pipeline: the schema validates the
//! submitted fields into a [`ReportForm`], the desk posts it and mirrors it
//! to the audit channel. Rework and revert reports also carry a pair of
//! coordinator-only review buttons that resolve the report once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLog};
use crate::auth::AuthorizationGate;
use crate::error::{DispatchError, Result};
use crate::platform::{mention, Control, Member, MessageRef, Messenger, Outbound};
use crate::scheduler::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    AvailabilityChange,
    TatDelay,
    FileUpdate,
    Rework,
    Revert,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub max_len: usize,
}

const fn field(key: &'static str, label: &'static str, required: bool, max_len: usize) -> FieldSpec {
    FieldSpec {
        key,
        label,
        required,
        max_len,
    }
}

/// Labels and resulting dispositions of the two review buttons.
#[derive(Debug)]
pub struct ReviewSpec {
    pub approve_label: &'static str,
    pub approve_disposition: &'static str,
    pub deny_label: &'static str,
    pub deny_disposition: &'static str,
}

#[derive(Debug)]
pub struct ReportSchema {
    pub kind: ReportKind,
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
    pub review: Option<ReviewSpec>,
}

static AVAILABILITY_CHANGE: ReportSchema = ReportSchema {
    kind: ReportKind::AvailabilityChange,
    title: "🕒 Availability Change",
    fields: &[
        field("current_block", "Current time block", true, 100),
        field("new_block", "New time block", true, 100),
        field("reason", "Reason", true, 1000),
    ],
    review: None,
};

static TAT_DELAY: ReportSchema = ReportSchema {
    kind: ReportKind::TatDelay,
    title: "⏳ TAT Delay",
    fields: &[
        field("file_name", "File name", true, 200),
        field("expected_delay", "Expected delay", true, 100),
        field("reason", "Reason", true, 1000),
    ],
    review: None,
};

static FILE_UPDATE: ReportSchema = ReportSchema {
    kind: ReportKind::FileUpdate,
    title: "📝 File Update",
    fields: &[
        field("file_name", "File name", true, 200),
        field("status", "Status", true, 200),
        field("notes", "Notes", false, 1000),
    ],
    review: None,
};

static REWORK: ReportSchema = ReportSchema {
    kind: ReportKind::Rework,
    title: "🔁 Rework Request",
    fields: &[
        field("file_name", "File name", true, 200),
        field("details", "Rework details", true, 1000),
    ],
    review: Some(ReviewSpec {
        approve_label: "Approve",
        approve_disposition: "✅ Approved",
        deny_label: "Deny",
        deny_disposition: "❌ Denied",
    }),
};

static REVERT: ReportSchema = ReportSchema {
    kind: ReportKind::Revert,
    title: "↩️ Revert Report",
    fields: &[
        field("file_name", "File name", true, 200),
        field("reason", "Revert reason", true, 1000),
    ],
    review: Some(ReviewSpec {
        approve_label: "Validate",
        approve_disposition: "✅ Validated",
        deny_label: "Note",
        deny_disposition: "📝 Noted",
    }),
};

impl ReportKind {
    pub fn schema(self) -> &'static ReportSchema {
        match self {
            ReportKind::AvailabilityChange => &AVAILABILITY_CHANGE,
            ReportKind::TatDelay => &TAT_DELAY,
            ReportKind::FileUpdate => &FILE_UPDATE,
            ReportKind::Rework => &REWORK,
            ReportKind::Revert => &REVERT,
        }
    }
}

/// Validated submission, ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportForm {
    pub kind: ReportKind,
    pub requester_id: u64,
    /// `(label, value)` in schema order; blank optional fields are skipped
    pub fields: Vec<(&'static str, String)>,
}

impl ReportSchema {
    pub fn collect(&self, requester_id: u64, raw: &BTreeMap<String, String>) -> Result<ReportForm> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in self.fields {
            let value = raw.get(spec.key).map(|v| v.trim()).unwrap_or("");
            if value.is_empty() {
                if spec.required {
                    return Err(DispatchError::MissingField(spec.label.to_string()));
                }
                continue;
            }
            if value.chars().count() > spec.max_len {
                return Err(DispatchError::FieldTooLong {
                    field: spec.label.to_string(),
                    max: spec.max_len,
                });
            }
            fields.push((spec.label, value.to_string()));
        }
        Ok(ReportForm {
            kind: self.kind,
            requester_id,
            fields,
        })
    }
}

impl ReportForm {
    pub fn render(&self) -> String {
        let mut text = format!(
            "**{}**\nSubmitted by: {}",
            self.kind.schema().title,
            mention(self.requester_id)
        );
        for (label, value) in &self.fields {
            text.push_str(&format!("\n**{}:** {}", label, value));
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Deny,
}

/// Review button press decoded from its control id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewAction {
    pub review_id: Uuid,
    pub decision: ReviewDecision,
}

impl ReviewAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        let rest = custom_id.strip_prefix("review:")?;
        let (decision, id) = rest.split_once(':')?;
        let decision = match decision {
            "approve" => ReviewDecision::Approve,
            "deny" => ReviewDecision::Deny,
            _ => return None,
        };
        Some(Self {
            review_id: Uuid::parse_str(id).ok()?,
            decision,
        })
    }

    fn controls(review_id: Uuid, spec: &ReviewSpec) -> [Control; 2] {
        [
            Control::new(format!("review:approve:{}", review_id), spec.approve_label),
            Control::new(format!("review:deny:{}", review_id), spec.deny_label),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Open,
    Resolved { by: u64, disposition: &'static str },
}

/// How long a resolved review is kept for late clicks.
const RESOLVED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Review {
    kind: ReportKind,
    requester_id: u64,
    record: MessageRef,
    body: Outbound,
    state: ReviewState,
    resolved_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct FiledReport {
    pub record: MessageRef,
    pub review_id: Option<Uuid>,
    pub audited: bool,
}

/// Posts reports and resolves their reviews.
pub struct ReportDesk {
    gate: AuthorizationGate,
    messenger: Arc<dyn Messenger>,
    audit: AuditLog,
    reviews: Mutex<HashMap<Uuid, Review>>,
}

impl ReportDesk {
    pub fn new(gate: AuthorizationGate, messenger: Arc<dyn Messenger>, audit: AuditLog) -> Self {
        Self {
            gate,
            messenger,
            audit,
            reviews: Mutex::new(HashMap::new()),
        }
    }

    /// Validates and posts a report. Open to every member.
    pub async fn file(
        &self,
        requester: &Member,
        origin: Origin,
        kind: ReportKind,
        raw: &BTreeMap<String, String>,
    ) -> Result<FiledReport> {
        let schema = kind.schema();
        let form = schema.collect(requester.id, raw)?;
        let rendered = form.render();

        let review_id = schema.review.as_ref().map(|_| Uuid::new_v4());
        let mut body = Outbound::text(rendered.clone());
        if let (Some(id), Some(spec)) = (review_id, schema.review.as_ref()) {
            for control in ReviewAction::controls(id, spec) {
                body = body.with_control(control);
            }
        }

        let record = self
            .messenger
            .post(origin.guild_id, origin.channel_id, body.clone())
            .await?;

        if let Some(id) = review_id {
            let mut reviews = self.reviews.lock().await;
            reviews.retain(|_, r| match r.resolved_at {
                Some(resolved) => resolved.elapsed() < RESOLVED_RETENTION,
                None => true,
            });
            reviews.insert(
                id,
                Review {
                    kind,
                    requester_id: requester.id,
                    record: record.clone(),
                    body,
                    state: ReviewState::Open,
                    resolved_at: None,
                },
            );
        }

        tracing::info!(kind = ?kind, requester_id = requester.id, "Report filed");
        let audited = self
            .audit
            .emit(origin.guild_id, AuditEvent::Report { body: rendered })
            .await;

        Ok(FiledReport {
            record,
            review_id,
            audited,
        })
    }

    pub async fn review_state(&self, review_id: Uuid) -> Option<ReviewState> {
        self.reviews
            .lock()
            .await
            .get(&review_id)
            .map(|r| r.state.clone())
    }

    /// Coordinator disposition of a rework/revert report. Single
    /// transition; a second press gets [`DispatchError::TicketClosed`].
    pub async fn resolve(&self, actor: &Member, action: ReviewAction) -> Result<&'static str> {
        self.gate.require(actor)?;

        let (kind, requester_id, record, body, disposition) = {
            let mut reviews = self.reviews.lock().await;
            let review = reviews.get_mut(&action.review_id).ok_or_else(|| {
                DispatchError::StaleReference(format!("review {}", action.review_id))
            })?;
            if review.state != ReviewState::Open {
                return Err(DispatchError::TicketClosed);
            }
            let spec = review
                .kind
                .schema()
                .review
                .as_ref()
                .ok_or(DispatchError::TicketClosed)?;
            let disposition = match action.decision {
                ReviewDecision::Approve => spec.approve_disposition,
                ReviewDecision::Deny => spec.deny_disposition,
            };
            review.state = ReviewState::Resolved {
                by: actor.id,
                disposition,
            };
            review.resolved_at = Some(Instant::now());
            (
                review.kind,
                review.requester_id,
                review.record.clone(),
                review.body.clone(),
                disposition,
            )
        };

        tracing::info!(review_id = %action.review_id, actor_id = actor.id, disposition, "Review resolved");

        let status = format!("**Status:** {} by {}", disposition, actor.mention());
        let mut edited = body.disabled();
        edited.content = format!("{}\n\n{}", edited.content, status);
        match self.messenger.edit(&record, edited).await {
            Ok(()) => {}
            Err(DispatchError::StaleReference(_)) => {
                let text = format!("{}\n{}", kind.schema().title, status);
                if let Err(e) = self
                    .messenger
                    .post(record.guild_id, record.channel_id, Outbound::text(text))
                    .await
                {
                    tracing::warn!(error = %e, "Review outcome not posted");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Review record not updated"),
        }

        let notice = format!(
            "Your {} report was marked {} by {}.\n{}",
            kind.schema().title,
            disposition,
            actor.mention(),
            record.jump_url()
        );
        if let Err(e) = self
            .messenger
            .direct_message(requester_id, Outbound::text(notice))
            .await
        {
            tracing::debug!(requester_id, error = %e, "Review outcome DM not delivered");
        }

        self.audit
            .emit(
                record.guild_id,
                AuditEvent::Report {
                    body: format!("{} for {}\n{}", kind.schema().title, mention(requester_id), status),
                },
            )
            .await;

        Ok(disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn collect_keeps_schema_order() {
        let form = ReportKind::TatDelay
            .schema()
            .collect(
                5,
                &raw(&[
                    ("reason", "bad audio"),
                    ("file_name", "ACME"),
                    ("expected_delay", "30m"),
                ]),
            )
            .unwrap();
        let labels: Vec<_> = form.fields.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["File name", "Expected delay", "Reason"]);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = ReportKind::Rework
            .schema()
            .collect(5, &raw(&[("file_name", "ACME"), ("details", "   ")]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingField(ref f) if f == "Rework details"));
    }

    #[test]
    fn optional_field_may_be_blank() {
        let form = ReportKind::FileUpdate
            .schema()
            .collect(5, &raw(&[("file_name", "ACME"), ("status", "FR done")]))
            .unwrap();
        assert_eq!(form.fields.len(), 2);
    }

    #[test]
    fn overlong_field_is_rejected() {
        let long = "x".repeat(101);
        let err = ReportKind::AvailabilityChange
            .schema()
            .collect(
                5,
                &raw(&[("current_block", &long), ("new_block", "b"), ("reason", "r")]),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::FieldTooLong { max: 100, .. }));
    }

    #[test]
    fn only_rework_and_revert_are_reviewed() {
        let reviewed: Vec<_> = [
            ReportKind::AvailabilityChange,
            ReportKind::TatDelay,
            ReportKind::FileUpdate,
            ReportKind::Rework,
            ReportKind::Revert,
        ]
        .into_iter()
        .filter(|k| k.schema().review.is_some())
        .collect();
        assert_eq!(reviewed, vec![ReportKind::Rework, ReportKind::Revert]);
    }

    #[test]
    fn render_lists_requester_and_fields() {
        let form = ReportForm {
            kind: ReportKind::Revert,
            requester_id: 8,
            fields: vec![("File name", "ACME".to_string())],
        };
        assert_eq!(
            form.render(),
            "**↩️ Revert Report**\nSubmitted by: <@8>\n**File name:** ACME"
        );
    }

    #[test]
    fn review_action_parsing() {
        let id = Uuid::new_v4();
        let action = ReviewAction::from_custom_id(&format!("review:deny:{}", id)).unwrap();
        assert_eq!(action.review_id, id);
        assert_eq!(action.decision, ReviewDecision::Deny);
        assert!(ReviewAction::from_custom_id("review:maybe:x").is_none());
        assert!(ReviewAction::from_custom_id(&format!("confirm:{}", id)).is_none());
    }
}
