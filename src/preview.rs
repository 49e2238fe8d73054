//! Messages for the preview surface.

use serde::{Deserialize, Serialize};

/// One update for the preview. Only the fields that changed are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Reset the preview before anything else is applied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear: bool,
}

impl PreviewMessage {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: Some(css.into()),
            ..Self::default()
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }

    pub fn clear() -> Self {
        Self {
            clear: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_set_fields_are_sent() {
        assert_eq!(serde_json::to_value(PreviewMessage::css("a{}")).unwrap(), json!({ "css": "a{}" }));
        assert_eq!(serde_json::to_value(PreviewMessage::clear()).unwrap(), json!({ "clear": true }));
        assert_eq!(serde_json::to_value(PreviewMessage::default()).unwrap(), json!({}));
    }

    #[test]
    fn parses_partial_messages() {
        let msg: PreviewMessage = serde_json::from_str(r#"{"html":"<p>hi</p>"}"#).unwrap();
        assert_eq!(msg, PreviewMessage::html("<p>hi</p>"));
    }
}
