//! `{name}`-placeholder substitution against an event's payload
//! Producers precompute `total_formatted` / `amount_formatted` fields so
//! templates never need a `{total/100:.2f}`-style expression evaluator.

use std::collections::HashMap;

use crate::models::NotificationTemplate;

/// Substitutes every `{key}` token in `template` from `context`. Returns
/// `None` if any placeholder has no matching key, so the caller can fall
/// back to a hard-coded subject/message without crashing the handler.
pub fn render(template: &str, context: &HashMap<&str, String>) -> Option<String> {
    let mut result = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(rel_end) = template[i..].find('}') {
                let key = &template[i + 1..i + rel_end];
                match context.get(key) {
                    Some(value) => {
                        result.push_str(value);
                        i += rel_end + 1;
                        continue;
                    }
                    None => return None,
                }
            }
        }
        let ch = template[i..].chars().next().expect("i is a char boundary");
        result.push(ch);
        i += ch.len_utf8();
    }
    Some(result)
}

/// Rendered (subject, message) pair, plus whether the fallback was used.
pub struct Rendered {
    pub subject: String,
    pub message: String,
    pub used_fallback: bool,
}

/// Renders a template against `context`; on any missing placeholder in
/// either half, both halves fall back to the hard-coded copy for
/// `event_type`; rendering is all-or-nothing across both halves.
pub fn render_notification(
    template: &NotificationTemplate,
    event_type: &str,
    context: &HashMap<&str, String>,
) -> Rendered {
    match (
        render(&template.title_template, context),
        render(&template.message_template, context),
    ) {
        (Some(subject), Some(message)) => Rendered {
            subject,
            message,
            used_fallback: false,
        },
        _ => {
            let (subject, message) = fallback_copy(event_type);
            Rendered {
                subject: subject.to_string(),
                message: message.to_string(),
                used_fallback: true,
            }
        }
    }
}

fn fallback_copy(event_type: &str) -> (&'static str, &'static str) {
    match event_type {
        "OrderCreated" => ("Order received", "Your order has been received and is being processed."),
        "OrderPaid" => ("Payment confirmed", "Your payment was processed successfully."),
        "PaymentFailed" => ("Payment failed", "We could not process payment for your order."),
        _ => ("Notification", "You have a new notification."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_placeholders() {
        let mut ctx = HashMap::new();
        ctx.insert("order_id", "abc-123".to_string());
        ctx.insert("total_formatted", "19.98".to_string());
        let rendered = render("Order {order_id} totals {total_formatted}", &ctx).unwrap();
        assert_eq!(rendered, "Order abc-123 totals 19.98");
    }

    #[test]
    fn render_returns_none_on_missing_placeholder() {
        let ctx = HashMap::new();
        assert!(render("Order {order_id}", &ctx).is_none());
    }

    #[test]
    fn render_notification_falls_back_on_missing_placeholder() {
        let template = NotificationTemplate {
            template_type: "OrderCreated".to_string(),
            title_template: "Order received".to_string(),
            message_template: "Your order {order_id} totals {total_formatted}".to_string(),
        };
        let ctx = HashMap::new();
        let rendered = render_notification(&template, "OrderCreated", &ctx);
        assert!(rendered.used_fallback);
        assert_eq!(rendered.subject, "Order received");
    }
}
