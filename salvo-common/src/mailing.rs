//! Mailing definitions (read-only input to composition)

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MailingId(u64);

impl MailingId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MailingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery channel of a mailing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Email,
    Sms,
}

/// A file attached to every message of a mailing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: PathBuf,
    pub mime_type: String,
    /// File name presented to the recipient
    pub name: String,
}

/// Templates handed to the renderer for a batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Template for the recipient display name used in the `To` header
    pub to_name: String,
}

/// Token appended to html bodies when open tracking is enabled
pub const OPEN_TRACKING_TOKEN: &str = "{action.trackOpenHtml}";

/// Display-name template used for the `To` header
pub const DISPLAY_NAME_TOKEN: &str = "{contact.display_name}";

/// A message template plus sender identity and tracking options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mailing {
    pub id: MailingId,
    pub name: String,
    pub from_name: String,
    pub from_email: String,
    #[serde(default)]
    pub replyto_email: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    /// Set for mailings authored with a template engine; mailings without
    /// one predate the pipeline
    #[serde(default)]
    pub template_type: Option<String>,
    #[serde(default)]
    pub sms_provider_id: Option<u64>,
    /// Locale to render under, e.g. `fr_FR`
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub open_tracking: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Mailing {
    #[must_use]
    pub const fn channel(&self) -> Channel {
        if self.sms_provider_id.is_some() {
            Channel::Sms
        } else {
            Channel::Email
        }
    }

    /// The templates to render for this mailing.
    ///
    /// With open tracking enabled, the tracking token is appended to a
    /// non-empty html body.
    #[must_use]
    pub fn templates(&self) -> TemplateSpec {
        let mut html = self.body_html.clone().unwrap_or_default();
        if self.open_tracking && !html.is_empty() {
            html.push('\n');
            html.push_str(OPEN_TRACKING_TOKEN);
        }

        TemplateSpec {
            subject: self.subject.clone(),
            text: self.body_text.clone().unwrap_or_default(),
            html,
            to_name: DISPLAY_NAME_TOKEN.to_string(),
        }
    }

    /// The `From` header value
    #[must_use]
    pub fn from_header(&self) -> String {
        format!("\"{}\" <{}>", self.from_name, self.from_email)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn mailing() -> Mailing {
        Mailing {
            id: MailingId::new(3),
            from_name: "News Desk".to_string(),
            from_email: "news@example.org".to_string(),
            subject: "Hello {contact.first_name}".to_string(),
            body_text: Some("Plain".to_string()),
            body_html: Some("<p>Hi</p>".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_templates_without_tracking() {
        let spec = mailing().templates();
        assert_eq!(
            spec,
            TemplateSpec {
                subject: "Hello {contact.first_name}".to_string(),
                text: "Plain".to_string(),
                html: "<p>Hi</p>".to_string(),
                to_name: DISPLAY_NAME_TOKEN.to_string(),
            }
        );
    }

    #[test]
    fn test_open_tracking_appends_token() {
        let mut mailing = mailing();
        mailing.open_tracking = true;
        assert_eq!(mailing.templates().html, "<p>Hi</p>\n{action.trackOpenHtml}");

        mailing.body_html = None;
        assert_eq!(mailing.templates().html, "");
    }

    #[test]
    fn test_channel_follows_sms_provider() {
        let mut mailing = mailing();
        assert_eq!(mailing.channel(), Channel::Email);
        mailing.sms_provider_id = Some(9);
        assert_eq!(mailing.channel(), Channel::Sms);
    }

    #[test]
    fn test_from_header() {
        assert_eq!(mailing().from_header(), "\"News Desk\" <news@example.org>");
    }
}
