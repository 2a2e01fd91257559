//! Message templates and the single-placeholder renderer.
//!
//! A template body may contain one named placeholder, `{greeting}`, which is
//! replaced with `Hi <display name>`. `{{` and `}}` produce literal braces.
//! Any other `{name}` is undefined and rejected rather than sent verbatim.

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::recipients::Recipient;

/// Name of the only placeholder a template may reference.
pub const GREETING_PLACEHOLDER: &str = "greeting";

/// Subject used for a custom template saved without one.
pub const DEFAULT_CUSTOM_SUBJECT: &str = "Hello";

/// Body used for a custom template saved without one.
pub const DEFAULT_CUSTOM_BODY: &str = "Hi {greeting}";

/// Template selection, resolved once at run start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Template {
    BuiltIn { name: String },
    Custom { subject: String, body: String },
}

/// A concrete (subject, body) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTemplate {
    pub subject: String,
    pub body: String,
}

struct BuiltIn {
    name: &'static str,
    subject: &'static str,
    body: &'static str,
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        name: "default",
        subject: "Exploring opportunities with your team",
        body: "{greeting},

I hope you're having a productive and meaningful day.

I'm reaching out to explore any potential openings on your team. I've been \
following the work your organization delivers, and I'd be excited to \
contribute my skills to such a forward-thinking environment.

I've attached my resume for your review. If there are any current or \
upcoming opportunities where I could contribute, I'd love to connect and \
discuss further.

Warm regards,
",
    },
    BuiltIn {
        name: "concise",
        subject: "Software engineering opportunity",
        body: "{greeting},

I hope this email finds you well. I'm interested in exploring \
opportunities with your team.

I've attached my resume for your consideration. I'd appreciate the \
opportunity to discuss how my skills align with your current needs.

Best regards,
",
    },
];

impl Template {
    pub fn built_in(name: impl Into<String>) -> Self {
        Self::BuiltIn { name: name.into() }
    }

    pub fn custom(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Custom {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Resolve into a concrete subject/body pair.
    pub fn resolve(&self) -> Result<ResolvedTemplate, TemplateError> {
        match self {
            Self::BuiltIn { name } => BUILT_INS
                .iter()
                .find(|b| b.name == name)
                .map(|b| ResolvedTemplate {
                    subject: b.subject.to_string(),
                    body: b.body.to_string(),
                })
                .ok_or_else(|| TemplateError::UnknownBuiltIn(name.clone())),
            Self::Custom { subject, body } => Ok(ResolvedTemplate {
                subject: subject.clone(),
                body: body.clone(),
            }),
        }
    }
}

/// Whether `name` is one of the built-in templates.
pub fn is_built_in(name: &str) -> bool {
    BUILT_INS.iter().any(|b| b.name == name)
}

/// All built-in templates, keyed by name.
pub fn built_ins() -> Vec<(&'static str, ResolvedTemplate)> {
    BUILT_INS
        .iter()
        .map(|b| {
            (
                b.name,
                ResolvedTemplate {
                    subject: b.subject.to_string(),
                    body: b.body.to_string(),
                },
            )
        })
        .collect()
}

impl ResolvedTemplate {
    /// Check the body without rendering it.
    pub fn validate(&self) -> Result<(), TemplateError> {
        substitute(&self.body, "").map(|_| ())
    }

    /// Render the body for one recipient.
    pub fn render(&self, recipient: &Recipient) -> Result<String, TemplateError> {
        substitute(&self.body, &greeting_for(recipient))
    }
}

/// Greeting text substituted for `{greeting}`.
pub fn greeting_for(recipient: &Recipient) -> String {
    format!("Hi {}", recipient.display_name)
}

fn substitute(body: &str, greeting: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(body.len() + greeting.len());
    let mut rest = body;
    let mut offset = 0;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let consumed = if tail.starts_with("{{") {
            out.push('{');
            2
        } else if tail.starts_with("}}") {
            out.push('}');
            2
        } else if tail.starts_with('}') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        } else {
            let close = tail
                .find('}')
                .ok_or(TemplateError::UnbalancedBrace(offset + pos))?;
            let name = &tail[1..close];
            if name != GREETING_PLACEHOLDER {
                return Err(TemplateError::UndefinedPlaceholder(name.to_string()));
            }
            out.push_str(greeting);
            close + 1
        };

        offset += pos + consumed;
        rest = &rest[pos + consumed..];
    }

    out.push_str(rest);
    Ok(out)
}
