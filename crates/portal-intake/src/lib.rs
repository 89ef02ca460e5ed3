//! New-case submission workflow.
//!
//! An [`IntakeForm`] walks from category selection through an optional
//! recommended-articles gate and detail entry to a terminal submitted state.
//! Every rejected action leaves the form unchanged.

use std::collections::BTreeSet;

use portal_core::{
    AttachmentMeta, CaseSubmission, RequestCategory, Urgency, ESCALATION_QUEUE,
    TRIED_SOLUTION_OPTIONS,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "portal-intake";

pub const MAX_ATTACHMENTS: usize = 5;
pub const MIN_DESCRIPTION_CHARS: usize = 20;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const DEFAULT_VENUE_PARTNER_ID: &str = "VEN-001";
pub const OTHER_SOLUTION: &str = "other";

/// Acknowledgement state for the category's recommended articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticlesGate {
    #[default]
    NoGateNeeded,
    GatePending,
    GateAcknowledged,
}

impl ArticlesGate {
    pub fn is_passed(self) -> bool {
        !matches!(self, Self::GatePending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntakeStage {
    CategoryUnselected,
    CategorySelected,
    SubcategorySelected,
    ArticlesGatePending,
    ArticlesReviewed,
    DetailEntry,
    Submittable,
    Submitted,
}

/// Something still missing before the form can be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Requirement {
    Category,
    SubCategory,
    ArticlesReviewed,
    Urgency,
    Description,
}

impl Requirement {
    pub fn label(self) -> &'static str {
        match self {
            Self::Category => "request category",
            Self::SubCategory => "sub-category",
            Self::ArticlesReviewed => "review of recommended articles",
            Self::Urgency => "urgency",
            Self::Description => "description of at least 20 characters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("this request has already been submitted")]
    AlreadySubmitted,
    #[error("select a request category first")]
    CategoryRequired,
    #[error("select a sub-category first")]
    SubCategoryRequired,
    #[error("`{value}` is not a sub-category of {category}")]
    UnknownSubCategory {
        category: RequestCategory,
        value: String,
    },
    #[error("there are no recommended articles to review")]
    NoArticlesToReview,
    #[error("review the recommended articles before entering details")]
    DetailsLocked,
    #[error("unknown solution option `{0}`")]
    UnknownSolution(String),
    #[error("maximum {max} attachments allowed ({present} attached, {incoming} selected)")]
    TooManyAttachments {
        present: usize,
        incoming: usize,
        max: usize,
    },
    #[error("no attachment at position {0}")]
    NoSuchAttachment(usize),
    #[error("still required: {}", .0.iter().map(|r| r.label()).collect::<Vec<_>>().join(", "))]
    Incomplete(Vec<Requirement>),
}

impl IntakeError {
    /// Recoverable problems are shown as a warning next to the form.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::TooManyAttachments { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeForm {
    category: Option<RequestCategory>,
    sub_category: Option<String>,
    recommended: Vec<String>,
    gate: ArticlesGate,
    event_id: String,
    venue_partner_id: String,
    market: String,
    urgency: Option<Urgency>,
    description: String,
    tried: BTreeSet<&'static str>,
    other_solution: String,
    attachments: Vec<AttachmentMeta>,
    submitted: bool,
}

impl IntakeForm {
    pub fn new(default_market: &str) -> Self {
        Self {
            category: None,
            sub_category: None,
            recommended: Vec::new(),
            gate: ArticlesGate::NoGateNeeded,
            event_id: String::new(),
            venue_partner_id: DEFAULT_VENUE_PARTNER_ID.to_string(),
            market: default_market.to_ascii_lowercase(),
            urgency: None,
            description: String::new(),
            tried: BTreeSet::new(),
            other_solution: String::new(),
            attachments: Vec::new(),
            submitted: false,
        }
    }

    fn ensure_open(&self) -> Result<(), IntakeError> {
        if self.submitted {
            Err(IntakeError::AlreadySubmitted)
        } else {
            Ok(())
        }
    }

    fn ensure_details_unlocked(&self) -> Result<(), IntakeError> {
        self.ensure_open()?;
        if self.category.is_none() {
            return Err(IntakeError::CategoryRequired);
        }
        if self.sub_category.is_none() {
            return Err(IntakeError::SubCategoryRequired);
        }
        if !self.gate.is_passed() {
            return Err(IntakeError::DetailsLocked);
        }
        Ok(())
    }

    /// Picking a different category clears the sub-category and any acknowledgement.
    pub fn select_category(
        &mut self,
        category: RequestCategory,
        recommended_article_ids: Vec<String>,
    ) -> Result<(), IntakeError> {
        self.ensure_open()?;
        if self.category == Some(category) {
            return Ok(());
        }
        self.category = Some(category);
        self.sub_category = None;
        self.recommended = recommended_article_ids;
        self.gate = ArticlesGate::NoGateNeeded;
        Ok(())
    }

    pub fn select_sub_category(&mut self, value: &str) -> Result<(), IntakeError> {
        self.ensure_open()?;
        let category = self.category.ok_or(IntakeError::CategoryRequired)?;
        let value = value.trim();
        if category.sub_category_label(value).is_none() {
            return Err(IntakeError::UnknownSubCategory {
                category,
                value: value.to_string(),
            });
        }
        if self.sub_category.as_deref() == Some(value) {
            return Ok(());
        }
        self.sub_category = Some(value.to_string());
        self.gate = if self.recommended.is_empty() {
            ArticlesGate::NoGateNeeded
        } else {
            ArticlesGate::GatePending
        };
        Ok(())
    }

    pub fn acknowledge_articles(&mut self, reviewed: bool) -> Result<(), IntakeError> {
        self.ensure_open()?;
        if self.sub_category.is_none() {
            return Err(IntakeError::SubCategoryRequired);
        }
        self.gate = match self.gate {
            ArticlesGate::NoGateNeeded => return Err(IntakeError::NoArticlesToReview),
            ArticlesGate::GatePending | ArticlesGate::GateAcknowledged if reviewed => {
                ArticlesGate::GateAcknowledged
            }
            ArticlesGate::GatePending | ArticlesGate::GateAcknowledged => ArticlesGate::GatePending,
        };
        Ok(())
    }

    pub fn set_event_id(&mut self, event_id: &str) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.event_id = event_id.trim().to_string();
        Ok(())
    }

    pub fn set_venue_partner_id(&mut self, id: &str) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.venue_partner_id = id.trim().to_string();
        Ok(())
    }

    pub fn set_market(&mut self, market: &str) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.market = market.trim().to_ascii_lowercase();
        Ok(())
    }

    pub fn set_urgency(&mut self, urgency: Urgency) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.urgency = Some(urgency);
        Ok(())
    }

    /// Input beyond [`MAX_DESCRIPTION_CHARS`] is dropped.
    pub fn set_description(&mut self, text: &str) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.description = text.chars().take(MAX_DESCRIPTION_CHARS).collect();
        Ok(())
    }

    /// Flips one tried-solution option and returns whether it is now selected.
    pub fn toggle_tried_solution(&mut self, value: &str) -> Result<bool, IntakeError> {
        self.ensure_details_unlocked()?;
        let option = TRIED_SOLUTION_OPTIONS
            .iter()
            .find(|o| o.value == value.trim())
            .ok_or_else(|| IntakeError::UnknownSolution(value.to_string()))?;
        if self.tried.remove(option.value) {
            Ok(false)
        } else {
            self.tried.insert(option.value);
            Ok(true)
        }
    }

    /// Replaces the selected solutions wholesale, as a submitted checkbox group does.
    pub fn set_tried_solutions<'a>(
        &mut self,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        let mut selected = BTreeSet::new();
        for value in values {
            let option = TRIED_SOLUTION_OPTIONS
                .iter()
                .find(|o| o.value == value.trim())
                .ok_or_else(|| IntakeError::UnknownSolution(value.to_string()))?;
            selected.insert(option.value);
        }
        self.tried = selected;
        Ok(())
    }

    pub fn set_other_solution(&mut self, text: &str) -> Result<(), IntakeError> {
        self.ensure_details_unlocked()?;
        self.other_solution = text.trim().to_string();
        Ok(())
    }

    /// Adds a whole batch or nothing at all.
    pub fn add_attachments(&mut self, batch: Vec<AttachmentMeta>) -> Result<usize, IntakeError> {
        self.ensure_details_unlocked()?;
        if self.attachments.len() + batch.len() > MAX_ATTACHMENTS {
            warn!(
                present = self.attachments.len(),
                incoming = batch.len(),
                "rejected attachment batch over the limit"
            );
            return Err(IntakeError::TooManyAttachments {
                present: self.attachments.len(),
                incoming: batch.len(),
                max: MAX_ATTACHMENTS,
            });
        }
        let added = batch.len();
        self.attachments.extend(batch);
        Ok(added)
    }

    pub fn remove_attachment(&mut self, index: usize) -> Result<AttachmentMeta, IntakeError> {
        self.ensure_open()?;
        if index >= self.attachments.len() {
            return Err(IntakeError::NoSuchAttachment(index));
        }
        Ok(self.attachments.remove(index))
    }

    pub fn detail_entry_enabled(&self) -> bool {
        self.ensure_details_unlocked().is_ok()
    }

    pub fn escalation_notice(&self) -> Option<String> {
        self.urgency.filter(|u| u.is_escalated()).map(|_| {
            format!(
                "Because this is high-urgency, your request will be escalated to the \
                 {ESCALATION_QUEUE} queue with expedited SLA."
            )
        })
    }

    pub fn missing_requirements(&self) -> Vec<Requirement> {
        let mut missing = Vec::new();
        if self.category.is_none() {
            missing.push(Requirement::Category);
        }
        if self.sub_category.is_none() {
            missing.push(Requirement::SubCategory);
        }
        if !self.gate.is_passed() {
            missing.push(Requirement::ArticlesReviewed);
        }
        if self.urgency.is_none() {
            missing.push(Requirement::Urgency);
        }
        if self.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
            missing.push(Requirement::Description);
        }
        missing
    }

    pub fn is_submittable(&self) -> bool {
        !self.submitted && self.missing_requirements().is_empty()
    }

    pub fn stage(&self) -> IntakeStage {
        if self.submitted {
            return IntakeStage::Submitted;
        }
        if self.category.is_none() {
            return IntakeStage::CategoryUnselected;
        }
        if self.sub_category.is_none() {
            return IntakeStage::CategorySelected;
        }
        if self.gate == ArticlesGate::GatePending {
            return IntakeStage::ArticlesGatePending;
        }
        if self.is_submittable() {
            return IntakeStage::Submittable;
        }
        let untouched = self.urgency.is_none() && self.description.is_empty();
        match (untouched, self.gate) {
            (true, ArticlesGate::GateAcknowledged) => IntakeStage::ArticlesReviewed,
            (true, _) => IntakeStage::SubcategorySelected,
            (false, _) => IntakeStage::DetailEntry,
        }
    }

    /// Consumes the draft's contents into a submission; the form is closed afterwards.
    pub fn submit(&mut self) -> Result<CaseSubmission, IntakeError> {
        self.ensure_open()?;
        let missing = self.missing_requirements();
        let (Some(category), Some(sub_category), Some(urgency), true) = (
            self.category,
            self.sub_category.clone(),
            self.urgency,
            missing.is_empty(),
        ) else {
            return Err(IntakeError::Incomplete(missing));
        };
        let submission = CaseSubmission {
            category,
            sub_category,
            event_id: (!self.event_id.is_empty()).then(|| self.event_id.clone()),
            venue_partner_id: self.venue_partner_id.clone(),
            market: self.market.clone(),
            urgency,
            description: self.description.trim().to_string(),
            tried_solutions: self.tried_solution_labels(),
            attachments: self.attachments.clone(),
        };
        self.submitted = true;
        info!(
            category = %category,
            urgency = %urgency,
            attachments = submission.attachments.len(),
            "new case draft submitted"
        );
        Ok(submission)
    }

    fn tried_solution_labels(&self) -> Vec<String> {
        TRIED_SOLUTION_OPTIONS
            .iter()
            .filter(|o| self.tried.contains(o.value))
            .map(|o| {
                if o.value == OTHER_SOLUTION && !self.other_solution.is_empty() {
                    format!("{}: {}", o.label, self.other_solution)
                } else {
                    o.label.to_string()
                }
            })
            .collect()
    }

    pub fn category(&self) -> Option<RequestCategory> {
        self.category
    }

    pub fn sub_category(&self) -> Option<&str> {
        self.sub_category.as_deref()
    }

    pub fn recommended_article_ids(&self) -> &[String] {
        &self.recommended
    }

    pub fn gate(&self) -> ArticlesGate {
        self.gate
    }

    pub fn articles_reviewed(&self) -> bool {
        self.gate == ArticlesGate::GateAcknowledged
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn venue_partner_id(&self) -> &str {
        &self.venue_partner_id
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn urgency(&self) -> Option<Urgency> {
        self.urgency
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn description_chars(&self) -> usize {
        self.description.chars().count()
    }

    pub fn is_tried(&self, value: &str) -> bool {
        self.tried.contains(value)
    }

    pub fn other_solution_enabled(&self) -> bool {
        self.tried.contains(OTHER_SOLUTION)
    }

    pub fn other_solution(&self) -> &str {
        &self.other_solution
    }

    pub fn attachments(&self) -> &[AttachmentMeta] {
        &self.attachments
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recs() -> Vec<String> {
        vec!["kb-access-1".into(), "kb-hardware-1".into()]
    }

    fn file(name: &str) -> AttachmentMeta {
        AttachmentMeta {
            name: name.into(),
            size: 2048,
            content_type: "image/png".into(),
        }
    }

    /// Category, sub-category and gate done; details unlocked.
    fn unlocked() -> IntakeForm {
        let mut form = IntakeForm::new("US");
        form.select_category(RequestCategory::EventDay, recs()).unwrap();
        form.select_sub_category("scanner-sync").unwrap();
        form.acknowledge_articles(true).unwrap();
        form
    }

    #[test]
    fn starts_unselected_with_defaults() {
        let form = IntakeForm::new("US");
        assert_eq!(form.stage(), IntakeStage::CategoryUnselected);
        assert_eq!(form.market(), "us");
        assert_eq!(form.venue_partner_id(), DEFAULT_VENUE_PARTNER_ID);
        assert!(!form.detail_entry_enabled());
    }

    #[test]
    fn changing_category_resets_sub_category_and_review() {
        let mut form = unlocked();
        assert!(form.articles_reviewed());
        form.select_category(RequestCategory::SettlementPayments, vec!["kb-settlement-1".into()])
            .unwrap();
        assert_eq!(form.sub_category(), None);
        assert!(!form.articles_reviewed());
        assert_eq!(form.stage(), IntakeStage::CategorySelected);
    }

    #[test]
    fn sub_category_must_belong_to_category() {
        let mut form = IntakeForm::new("us");
        assert_eq!(
            form.select_sub_category("scanner-sync"),
            Err(IntakeError::CategoryRequired)
        );
        form.select_category(RequestCategory::EventDay, recs()).unwrap();
        assert!(matches!(
            form.select_sub_category("payment-delay"),
            Err(IntakeError::UnknownSubCategory { .. })
        ));
        assert_eq!(form.sub_category(), None);
    }

    #[test]
    fn gate_blocks_details_until_acknowledged() {
        let mut form = IntakeForm::new("us");
        form.select_category(RequestCategory::EventDay, recs()).unwrap();
        form.select_sub_category("scanner-sync").unwrap();
        assert_eq!(form.gate(), ArticlesGate::GatePending);
        assert_eq!(form.stage(), IntakeStage::ArticlesGatePending);
        assert_eq!(
            form.set_urgency(Urgency::Normal),
            Err(IntakeError::DetailsLocked)
        );

        form.acknowledge_articles(true).unwrap();
        assert_eq!(form.stage(), IntakeStage::ArticlesReviewed);
        form.set_urgency(Urgency::Normal).unwrap();
        assert_eq!(form.stage(), IntakeStage::DetailEntry);
    }

    #[test]
    fn no_recommendations_skip_the_gate() {
        let mut form = IntakeForm::new("us");
        form.select_category(RequestCategory::Other, vec![]).unwrap();
        form.select_sub_category("feedback").unwrap();
        assert_eq!(form.gate(), ArticlesGate::NoGateNeeded);
        assert_eq!(form.stage(), IntakeStage::SubcategorySelected);
        assert!(form.detail_entry_enabled());
        assert_eq!(
            form.acknowledge_articles(true),
            Err(IntakeError::NoArticlesToReview)
        );
    }

    #[test]
    fn new_sub_category_rearms_the_gate() {
        let mut form = unlocked();
        form.select_sub_category("scanner-sync").unwrap();
        assert!(form.articles_reviewed());
        form.select_sub_category("barcode-error").unwrap();
        assert_eq!(form.gate(), ArticlesGate::GatePending);
    }

    #[test]
    fn description_threshold_is_twenty_trimmed_chars() {
        let mut form = unlocked();
        form.set_urgency(Urgency::Normal).unwrap();
        form.set_description(&format!("  {}  ", "x".repeat(19))).unwrap();
        assert!(!form.is_submittable());
        assert_eq!(form.missing_requirements(), vec![Requirement::Description]);

        form.set_description(&"x".repeat(20)).unwrap();
        assert!(form.is_submittable());
        assert_eq!(form.stage(), IntakeStage::Submittable);
    }

    #[test]
    fn description_is_truncated() {
        let mut form = unlocked();
        form.set_description(&"é".repeat(MAX_DESCRIPTION_CHARS + 40)).unwrap();
        assert_eq!(form.description_chars(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn oversized_attachment_batch_adds_nothing() {
        let mut form = unlocked();
        let batch: Vec<_> = (0..6).map(|i| file(&format!("f{i}.png"))).collect();
        let err = form.add_attachments(batch).unwrap_err();
        assert!(err.is_warning());
        assert_eq!(err.to_string(), "maximum 5 attachments allowed (0 attached, 6 selected)");
        assert!(form.attachments().is_empty());

        assert_eq!(form.add_attachments(vec![file("a.png"), file("b.png")]), Ok(2));
        assert!(form.add_attachments((0..4).map(|_| file("c.png")).collect()).is_err());
        assert_eq!(form.attachments().len(), 2);
        assert_eq!(form.remove_attachment(0).unwrap().name, "a.png");
        assert_eq!(form.remove_attachment(3), Err(IntakeError::NoSuchAttachment(3)));
    }

    #[test]
    fn escalation_notice_only_for_critical_and_high() {
        let mut form = unlocked();
        form.set_urgency(Urgency::Normal).unwrap();
        assert_eq!(form.escalation_notice(), None);
        form.set_urgency(Urgency::High).unwrap();
        assert!(form.escalation_notice().unwrap().contains(ESCALATION_QUEUE));
    }

    #[test]
    fn submit_produces_submission_and_closes_the_form() {
        let mut form = unlocked();
        assert!(matches!(form.submit(), Err(IntakeError::Incomplete(_))));

        form.set_urgency(Urgency::Critical).unwrap();
        form.set_event_id(" EVT-204811 ").unwrap();
        form.set_description("Scanners at the north gate are offline.").unwrap();
        form.set_tried_solutions(["device-diagnostics", "other"]).unwrap();
        form.set_other_solution("Rebooted the router").unwrap();
        form.add_attachments(vec![file("gate.png")]).unwrap();

        let submission = form.submit().unwrap();
        assert_eq!(submission.category, RequestCategory::EventDay);
        assert_eq!(submission.event_id.as_deref(), Some("EVT-204811"));
        assert_eq!(
            submission.tried_solutions,
            ["Performed scanner/device diagnostics", "Other: Rebooted the router"]
        );
        assert_eq!(form.stage(), IntakeStage::Submitted);
        assert_eq!(form.submit(), Err(IntakeError::AlreadySubmitted));
        assert_eq!(
            form.set_description("changed after the fact"),
            Err(IntakeError::AlreadySubmitted)
        );
    }

    #[test]
    fn tried_solutions_toggle_and_reject_unknown_values() {
        let mut form = unlocked();
        assert_eq!(form.toggle_tried_solution("other"), Ok(true));
        assert!(form.other_solution_enabled());
        assert_eq!(form.toggle_tried_solution("other"), Ok(false));
        assert!(matches!(
            form.toggle_tried_solution("prayed"),
            Err(IntakeError::UnknownSolution(_))
        ));
    }
}
