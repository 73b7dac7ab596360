//! Email primitives: recipient validation and strict draft parsing.

use crate::error::{Result, TaskError};

/// Subject + body produced by the drafting capability (or supplied by the operator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    /// Build a draft, rejecting blank fields.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let subject = subject.into().trim().to_string();
        let body = body.into().trim().to_string();
        if subject.is_empty() {
            return Err(TaskError::DraftGeneration("subject is empty".to_string()));
        }
        if subject.contains('\n') {
            return Err(TaskError::DraftGeneration(
                "subject spans multiple lines".to_string(),
            ));
        }
        if body.is_empty() {
            return Err(TaskError::DraftGeneration("body is empty".to_string()));
        }
        Ok(Self { subject, body })
    }
}

/// A fully addressed message handed to `Mailer::send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Syntactic email check.
///
/// Accepts `local@domain.tld` where local is `[A-Za-z0-9._%+-]+` and the domain
/// is dot-separated `[A-Za-z0-9-]` labels ending in an alphabetic TLD of 2+ chars.
pub fn is_valid_email(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.matches('@').count() != 1 {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    if !local_ok {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|l| {
        !l.is_empty()
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    labels_ok && tld_ok
}

/// Parse model output of the form:
///
/// ```text
/// Subject: <one line>
///
/// <body...>
/// ```
///
/// Anything else fails closed with `DraftGeneration`.
pub fn parse_draft(raw: &str) -> Result<EmailDraft> {
    let text = raw.trim();
    let mut lines = text.lines();

    let first = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| TaskError::DraftGeneration("empty draft output".to_string()))?;

    let first = first.trim();
    let subject = strip_prefix_ci(first, "subject:").ok_or_else(|| {
        TaskError::DraftGeneration(format!("expected 'Subject:' line, got '{first}'"))
    })?;

    let body: Vec<&str> = lines.collect();
    let body = body.join("\n");
    let body = match strip_prefix_ci(body.trim_start(), "body:") {
        Some(rest) => rest.to_string(),
        None => body,
    };

    if body.lines().any(|l| strip_prefix_ci(l.trim(), "subject:").is_some()) {
        return Err(TaskError::DraftGeneration(
            "draft contains more than one subject".to_string(),
        ));
    }

    EmailDraft::new(subject, body)
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(s[prefix.len()..].trim())
    } else {
        None
    }
}
