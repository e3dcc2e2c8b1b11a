use chrono::{DateTime, Utc};

use crate::platform::{time_tag, MessageRef};
use crate::scheduler::tat::TimeBudget;
use crate::scheduler::FileType;

/// One unit of work handed to one worker. Lives only as long as the
/// coordination around it; the audit entry and public record are its
/// durable trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub worker_id: u64,
    pub file_type: FileType,
    pub file_name: Option<String>,
    pub declared_duration: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub assigner_id: u64,
    pub was_dequeued: bool,
}

impl Assignment {
    pub fn time_tag(&self) -> String {
        time_tag(self.assigned_at.timestamp())
    }

    /// Body of the public assignment record.
    pub fn record_text(&self, budget: Option<&TimeBudget>) -> String {
        let mut text = format!(
            "📂 <@{}> has been assigned a **{}** at {}",
            self.worker_id,
            self.file_type,
            self.time_tag()
        );
        if let Some(name) = &self.file_name {
            text.push_str(&format!("\nFile: `{}`", name));
        }
        if let (Some(duration), Some(budget)) = (&self.declared_duration, budget) {
            text.push_str(&format!("\nDuration: `{}`\n{}", duration.trim(), budget.describe()));
        }
        text.push_str("\n\nPlease confirm receipt below.");
        text
    }

    /// Body of the direct notification to the worker.
    pub fn notice_text(&self, budget: Option<&TimeBudget>, record: &MessageRef) -> String {
        let mut text = format!(
            "Hello <@{}>, you have been assigned a **{}** at {}. Please start on it immediately.",
            self.worker_id,
            self.file_type,
            self.time_tag()
        );
        if let Some(name) = &self.file_name {
            text.push_str(&format!("\nFile: `{}`", name));
        }
        if let Some(budget) = budget {
            text.push_str(&format!("\n{}", budget.describe()));
        }
        text.push_str(
            "\n\nReminder that if no movement is observed on your file for at least 5 minutes, \
             and if your file is at risk of breaching TAT, SWC may REASSIGN your file without prior notice.\
             \n\nIf you will take longer on a file, keep the Senior Workflow Coordinators properly \
             appraised. Include your reasons.",
        );
        text.push_str(&format!("\n\nAssignment: {}", record.jump_url()));
        text
    }

    /// Public notice used when the worker's DMs are closed.
    pub fn fallback_text(&self) -> String {
        format!(
            "<@{}> ⚠️ I cannot DM you. You are assigned: **{}** at {}. Please start on it immediately.",
            self.worker_id,
            self.file_type,
            self.time_tag()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment {
            worker_id: 11,
            file_type: FileType::QuartrBatch,
            file_name: Some("ACME Q3 call".to_string()),
            declared_duration: Some("01:00:00".to_string()),
            assigned_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            assigner_id: 22,
            was_dequeued: true,
        }
    }

    #[test]
    fn record_includes_budget_when_computed() {
        let a = assignment();
        let budget = TimeBudget::compute(a.file_type, 3600);
        let text = a.record_text(Some(&budget));
        assert!(text.starts_with("📂 <@11> has been assigned a **QUARTR BATCH FILE** at <t:1700000000:F>"));
        assert!(text.contains("File: `ACME Q3 call`"));
        assert!(text.contains("Overall TAT: `02:00:00`"));
    }

    #[test]
    fn record_skips_budget_without_one() {
        let text = assignment().record_text(None);
        assert!(!text.contains("TAT"));
        assert!(!text.contains("Duration"));
    }

    #[test]
    fn notice_links_back_to_record() {
        let record = MessageRef::new(1, 2, 3);
        let text = assignment().notice_text(None, &record);
        assert!(text.contains("REASSIGN"));
        assert!(text.ends_with("https://discord.com/channels/1/2/3"));
    }
}
