//! Keyword-driven fallback content selection.

use gateway_core::{GatewayRequest, ServiceType};
use serde::Serialize;
use tracing::debug;

/// Category a fallback response was selected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCategory {
    /// Questions about who qualifies for a program
    Eligibility,
    /// Questions about readiness or maturity assessment levels
    ReadinessLevel,
    /// Questions about certifications and audits
    Certification,
    /// Everything else
    Generic,
}

impl FallbackCategory {
    /// Stable identifier for logs and outcomes
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eligibility => "eligibility",
            Self::ReadinessLevel => "readiness_level",
            Self::Certification => "certification",
            Self::Generic => "generic",
        }
    }
}

/// A selected fallback response
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    /// Pre-authored response body
    pub content: String,
    /// The category it was selected from
    pub category: FallbackCategory,
}

const ELIGIBILITY_KEYWORDS: &[&str] = &[
    "eligible",
    "eligibility",
    "qualify",
    "qualification",
    "who can apply",
    "requirements",
];

const READINESS_KEYWORDS: &[&str] = &[
    "readiness",
    "readiness level",
    "maturity",
    "assessment level",
    "trl",
];

const CERTIFICATION_KEYWORDS: &[&str] = &[
    "certification",
    "certificate",
    "certified",
    "audit",
    "accreditation",
];

/// Selects pre-authored content for requests the upstream cannot serve.
/// Pure and deterministic; no I/O.
#[derive(Debug, Clone, Default)]
pub struct FallbackSelector;

impl FallbackSelector {
    /// Create a selector
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Select a fallback for `request`
    #[must_use]
    pub fn select(&self, request: &GatewayRequest) -> FallbackResponse {
        let response = if request.service_type.as_str() == ServiceType::EXPLANATION {
            FallbackResponse {
                content: explanation_template(request),
                category: FallbackCategory::Generic,
            }
        } else {
            let category = classify(&request.payload);
            FallbackResponse {
                content: qa_body(category).to_string(),
                category,
            }
        };
        debug!(
            service = request.service_type.as_str(),
            category = response.category.as_str(),
            "Fallback selected"
        );
        response
    }
}

/// Classify free-form text by first keyword match, in priority order
fn classify(text: &str) -> FallbackCategory {
    let lowered = text.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if matches(ELIGIBILITY_KEYWORDS) {
        FallbackCategory::Eligibility
    } else if matches(READINESS_KEYWORDS) {
        FallbackCategory::ReadinessLevel
    } else if matches(CERTIFICATION_KEYWORDS) {
        FallbackCategory::Certification
    } else {
        FallbackCategory::Generic
    }
}

fn qa_body(category: FallbackCategory) -> &'static str {
    match category {
        FallbackCategory::Eligibility => {
            "Our assistant is temporarily unavailable. In general, program \
             eligibility depends on your organization's registration status, \
             size, and sector. Please check the eligibility criteria listed on \
             the program page, or contact support for a case-by-case review."
        }
        FallbackCategory::ReadinessLevel => {
            "Our assistant is temporarily unavailable. Readiness levels are \
             assessed on a staged scale from initial exploration to full \
             operational maturity; your most recent assessment report contains \
             your current level and the criteria for the next stage."
        }
        FallbackCategory::Certification => {
            "Our assistant is temporarily unavailable. Certification \
             typically requires a completed self-assessment, supporting \
             documentation, and a scheduled audit. Please refer to the \
             certification guide for the full checklist and timelines."
        }
        FallbackCategory::Generic => {
            "Our assistant is temporarily unavailable. Please try again in a \
             few minutes, or browse the help center for answers to common \
             questions."
        }
    }
}

/// One generic explanation populated with whatever structured fields the
/// caller supplied
fn explanation_template(request: &GatewayRequest) -> String {
    let field = |key: &str| {
        request
            .template_fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let program = field("program_name").unwrap_or("this program");
    let organization = field("organization_name").unwrap_or("your organization");

    let mut body = format!(
        "Results summary for {organization} regarding {program}."
    );
    if let Some(score) = field("score") {
        body.push_str(&format!(" The overall score is {score}."));
    }
    body.push_str(
        " A detailed analysis is temporarily unavailable; the full \
         explanation will be provided once the service is restored.",
    );
    body
}
