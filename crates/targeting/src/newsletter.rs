//! Email capture for newsletter popups: validation, request building and
//! mapping the subscribe response to what the visitor sees.

use popup_core::types::{NewsletterCopy, SubscribeRequest, SubscribeResponse, VisitorContext};
use popup_core::{PopupError, PopupResult};
use serde_json::json;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Thank you for subscribing!";
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// `local@domain.tld` with no whitespace anywhere.
pub fn validate_email(email: &str) -> PopupResult<()> {
    let invalid = || PopupError::Validation(format!("invalid email address: {email:?}"));
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    // need a dot with something on both sides somewhere in the domain
    let dotted = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());
    if !dotted {
        return Err(invalid());
    }
    Ok(())
}

pub fn build_request(
    email: &str,
    popup_id: &str,
    shop: &str,
    context: &VisitorContext,
) -> PopupResult<SubscribeRequest> {
    let email = email.trim();
    validate_email(email)?;
    Ok(SubscribeRequest {
        email: email.to_string(),
        popup_id: popup_id.to_string(),
        shop: shop.to_string(),
        metadata: Some(json!({
            "page": context.page,
            "deviceType": context.device.as_str(),
        })),
    })
}

/// What the form shows after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsletterOutcome {
    Subscribed { message: String },
    Failed { message: String },
}

/// A transport error and `{success: false}` look the same to the visitor.
pub fn outcome(copy: &NewsletterCopy, response: &PopupResult<SubscribeResponse>) -> NewsletterOutcome {
    match response {
        Ok(SubscribeResponse { success: true, .. }) => NewsletterOutcome::Subscribed {
            message: copy
                .success_message
                .clone()
                .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()),
        },
        _ => NewsletterOutcome::Failed {
            message: copy
                .error_message
                .clone()
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_core::types::DeviceClass;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("a.b+tag@mail.example.co.uk").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("ada@example").is_err());
        assert!(validate_email("ada example@x.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@.com").is_err());
        assert!(validate_email("ada@example.").is_err());
        assert!(validate_email("a@b@c.com").is_err());
    }

    #[test]
    fn test_build_request_carries_metadata() {
        let ctx = VisitorContext {
            device: DeviceClass::Mobile,
            page: "/".into(),
            country: None,
            session_id: "sess_x".into(),
        };
        let req = build_request("  ada@example.com ", "p1", "demo.myshopify.com", &ctx).unwrap();
        assert_eq!(req.email, "ada@example.com");
        let meta = req.metadata.unwrap();
        assert_eq!(meta["deviceType"], "MOBILE");
        assert_eq!(meta["page"], "/");
    }

    #[test]
    fn test_outcome_messages() {
        let copy = NewsletterCopy {
            success_message: Some("Welcome aboard".into()),
            ..Default::default()
        };
        let ok = Ok(SubscribeResponse {
            success: true,
            error: None,
        });
        assert_eq!(
            outcome(&copy, &ok),
            NewsletterOutcome::Subscribed {
                message: "Welcome aboard".into()
            }
        );
        let rejected = Ok(SubscribeResponse {
            success: false,
            error: Some("Popup not found or disabled".into()),
        });
        assert_eq!(
            outcome(&copy, &rejected),
            NewsletterOutcome::Failed {
                message: DEFAULT_ERROR_MESSAGE.into()
            }
        );
        let transport = Err(PopupError::Transport("connection reset".into()));
        assert!(matches!(outcome(&copy, &transport), NewsletterOutcome::Failed { .. }));
    }
}
