//! # Concurrent Update Merge
//!
//! Reconciles two divergent edits of the same truck ticket.
//!
//! ## Conflict Detection
//! ```text
//! original.version_tag   target.version_tag   attachment ids   → merge?
//! ────────────────────   ──────────────────   ──────────────     ──────
//! None / ""              anything             anything           no
//! "v1"                   "v1"                 anything           no
//! "v1"                   "v2"                 same set           no
//! "v1"                   "v2"                 different          YES
//! ```
//!
//! ## Attachment Merge
//! ```text
//! original: [A, B, C]      target: [B', D]      removed: {C}
//!      │                        │
//!      └──────────┬─────────────┘
//!                 ▼
//!   target entries first:        B' (same blob as B), D
//!   original-only, not removed:  A
//!   result:                      [B', D, A]
//!
//!   same id, different blob_path → AttachmentConflict (surfaced)
//! ```
//!
//! Attachment types are re-derived from file names on every update,
//! conflict or not.

use crate::error::{CoreError, CoreResult};
use crate::types::{Attachment, AttachmentType, TruckTicket};
use crate::validation::validate_volumes;
use crate::workflow::{always, BusinessContext, Pipeline, Stage, WorkflowStep};

const EXTERNAL_MARKER: &str = "-EXT";

fn has_tag(tag: &Option<String>) -> bool {
    tag.as_deref().map_or(false, |t| !t.is_empty())
}

/// Both edits carry distinct non-empty version tags and their attachment
/// id sets differ.
pub fn is_conflicting_update(original: &TruckTicket, target: &TruckTicket) -> bool {
    has_tag(&original.version_tag)
        && has_tag(&target.version_tag)
        && original.version_tag != target.version_tag
        && original.attachment_ids() != target.attachment_ids()
}

/// Union of both attachment lists keyed by id, target first.
///
/// Ids present only in the original are kept unless the target removed
/// them explicitly.
pub fn merge_attachments(original: &TruckTicket, target: &TruckTicket) -> CoreResult<Vec<Attachment>> {
    let mut merged = Vec::with_capacity(original.attachments.len() + target.attachments.len());

    for attachment in &target.attachments {
        let previous = original.attachments.iter().find(|a| a.id == attachment.id);
        if let Some(previous) = previous {
            if previous.blob_path != attachment.blob_path {
                return Err(CoreError::AttachmentConflict {
                    attachment_id: attachment.id.clone(),
                });
            }
        }
        merged.push(attachment.clone());
    }

    let target_ids = target.attachment_ids();
    for attachment in &original.attachments {
        if !target_ids.contains(attachment.id.as_str())
            && !target.removed_attachment_ids.contains(&attachment.id)
        {
            merged.push(attachment.clone());
        }
    }

    Ok(merged)
}

/// Attachment type implied by the file name convention.
pub fn classify_attachment(file_name: &str) -> AttachmentType {
    if file_name.to_ascii_uppercase().contains(EXTERNAL_MARKER) {
        AttachmentType::External
    } else {
        AttachmentType::Internal
    }
}

/// Overwrites every stored attachment type with the file-name-derived one.
pub fn correct_attachment_types(ticket: &mut TruckTicket) {
    for attachment in &mut ticket.attachments {
        attachment.attachment_type = classify_attachment(&attachment.file_name);
    }
}

// =============================================================================
// Truck ticket update pipeline
// =============================================================================

pub type TicketContext = BusinessContext<TruckTicket>;

fn has_concurrent_edit(ctx: &TicketContext) -> bool {
    ctx.original
        .as_ref()
        .map_or(false, |original| is_conflicting_update(original, &ctx.target))
}

fn validate_ticket_volumes(ctx: &mut TicketContext) -> CoreResult<()> {
    validate_volumes(&ctx.target.volumes)?;
    Ok(())
}

fn merge_concurrent_attachments(ctx: &mut TicketContext) -> CoreResult<()> {
    if let Some(original) = &ctx.original {
        ctx.target.attachments = merge_attachments(original, &ctx.target)?;
    }
    Ok(())
}

fn correct_types(ctx: &mut TicketContext) -> CoreResult<()> {
    correct_attachment_types(&mut ctx.target);
    Ok(())
}

/// Steps applied to a truck ticket before it is written.
pub fn truck_ticket_pipeline() -> Pipeline<TicketContext> {
    Pipeline::new()
        .with_step(WorkflowStep {
            name: "validate-volumes",
            stage: Stage::Validation,
            run_order: 0,
            should_run: always,
            apply: validate_ticket_volumes,
        })
        .with_step(WorkflowStep {
            name: "merge-concurrent-attachments",
            stage: Stage::PreSave,
            run_order: 10,
            should_run: has_concurrent_edit,
            apply: merge_concurrent_attachments,
        })
        .with_step(WorkflowStep {
            name: "correct-attachment-types",
            stage: Stage::PreSave,
            run_order: 20,
            should_run: always,
            apply: correct_types,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{attachment, ticket};
    use crate::types::Volumes;

    fn with_attachments(tag: &str, ids: &[&str]) -> TruckTicket {
        let mut t = ticket();
        t.version_tag = Some(tag.to_string());
        t.attachments = ids
            .iter()
            .map(|id| attachment(id, &format!("{}.pdf", id), AttachmentType::Internal))
            .collect();
        t
    }

    fn ids(attachments: &[Attachment]) -> Vec<&str> {
        attachments.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_conflict_detection() {
        let original = with_attachments("v1", &["A", "B"]);
        let target = with_attachments("v2", &["A"]);
        assert!(is_conflicting_update(&original, &target));

        let same_tag = with_attachments("v1", &["A"]);
        assert!(!is_conflicting_update(&original, &same_tag));

        let same_set = with_attachments("v2", &["B", "A"]);
        assert!(!is_conflicting_update(&original, &same_set));

        let mut untracked = with_attachments("v2", &["A"]);
        untracked.version_tag = Some(String::new());
        assert!(!is_conflicting_update(&original, &untracked));
        untracked.version_tag = None;
        assert!(!is_conflicting_update(&untracked, &original));
    }

    #[test]
    fn test_stale_empty_target_keeps_everything() {
        let original = with_attachments("v1", &["A", "B", "C"]);
        let target = with_attachments("v2", &[]);
        let merged = merge_attachments(&original, &target).unwrap();
        assert_eq!(ids(&merged), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_explicit_removal_is_not_resurrected() {
        let original = with_attachments("v1", &["A", "B", "C"]);
        let mut target = with_attachments("v2", &["B", "D"]);
        target.removed_attachment_ids.insert("C".to_string());

        let merged = merge_attachments(&original, &target).unwrap();
        assert_eq!(ids(&merged), vec!["B", "D", "A"]);
    }

    #[test]
    fn test_target_entry_wins_for_same_file() {
        let original = with_attachments("v1", &["A"]);
        let mut target = with_attachments("v2", &["A", "B"]);
        target.attachments[0].file_name = "renamed-EXT.pdf".to_string();

        let merged = merge_attachments(&original, &target).unwrap();
        assert_eq!(merged[0].file_name, "renamed-EXT.pdf");
    }

    #[test]
    fn test_same_id_different_blob_is_conflict() {
        let original = with_attachments("v1", &["A"]);
        let mut target = with_attachments("v2", &["A", "B"]);
        target.attachments[0].blob_path = "tickets/other".to_string();

        let err = merge_attachments(&original, &target).unwrap_err();
        assert!(matches!(err, CoreError::AttachmentConflict { attachment_id } if attachment_id == "A"));
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_attachment("LF01-10001-EXT.pdf"), AttachmentType::External);
        assert_eq!(classify_attachment("lf01-10001-ext.pdf"), AttachmentType::External);
        assert_eq!(classify_attachment("LF01-10001-INT.pdf"), AttachmentType::Internal);
        assert_eq!(classify_attachment("scan.pdf"), AttachmentType::Internal);
    }

    #[test]
    fn test_pipeline_merges_and_corrects_types() {
        let original = with_attachments("v1", &["A", "B"]);
        let mut target = with_attachments("v2", &[]);
        target
            .attachments
            .push(attachment("C", "LF01-10001-EXT.pdf", AttachmentType::Internal));

        let mut ctx = BusinessContext::update(original, target);
        let ran = truck_ticket_pipeline()
            .run_stages(&Stage::BEFORE_SAVE, &mut ctx)
            .unwrap();

        assert_eq!(
            ran,
            vec!["validate-volumes", "merge-concurrent-attachments", "correct-attachment-types"]
        );
        assert_eq!(ids(&ctx.target.attachments), vec!["C", "A", "B"]);
        assert_eq!(ctx.target.attachments[0].attachment_type, AttachmentType::External);
    }

    #[test]
    fn test_pipeline_corrects_types_without_conflict() {
        let mut target = with_attachments("v1", &[]);
        target
            .attachments
            .push(attachment("A", "ticket-EXT.jpg", AttachmentType::Internal));

        let mut ctx = BusinessContext::insert(target);
        let ran = truck_ticket_pipeline().run(Stage::PreSave, &mut ctx).unwrap();
        assert_eq!(ran, vec!["correct-attachment-types"]);
        assert_eq!(ctx.target.attachments[0].attachment_type, AttachmentType::External);
    }

    #[test]
    fn test_pipeline_rejects_bad_volumes() {
        let mut target = ticket();
        target.volumes = Volumes::fixed(-1.0, 0.0, 0.0);
        let mut ctx = BusinessContext::insert(target);
        assert!(truck_ticket_pipeline().run(Stage::Validation, &mut ctx).is_err());
    }
}
