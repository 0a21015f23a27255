use serde_json::Value;
use tera::{Context, Tera};
use tracing::warn;

pub const GENERIC_TEMPLATE: &str = "generic";

/// Renders the final message body from an intent's kind and payload.
/// A missing or broken template must not take the worker down: the generic
/// template is used instead and a warning is logged.
pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    pub fn new(tera: Tera) -> Self {
        Self { tera }
    }

    pub fn with_default_templates() -> Self {
        let mut tera = Tera::default();
        tera.add_raw_template("booking-confirmed", include_str!("../../templates/booking-confirmed.txt"))
            .expect("Failed to load booking-confirmed template");
        tera.add_raw_template("booking-declined", include_str!("../../templates/booking-declined.txt"))
            .expect("Failed to load booking-declined template");
        tera.add_raw_template("booking-rescheduled", include_str!("../../templates/booking-rescheduled.txt"))
            .expect("Failed to load booking-rescheduled template");
        tera.add_raw_template("reminder-24h", include_str!("../../templates/reminder-24h.txt"))
            .expect("Failed to load reminder-24h template");
        tera.add_raw_template("reminder-2h", include_str!("../../templates/reminder-2h.txt"))
            .expect("Failed to load reminder-2h template");
        tera.add_raw_template(GENERIC_TEMPLATE, include_str!("../../templates/generic.txt"))
            .expect("Failed to load generic template");
        Self::new(tera)
    }

    pub fn render(&self, kind: &str, payload: &Value) -> String {
        let context = match Context::from_value(payload.clone()) {
            Ok(ctx) => ctx,
            Err(_) => Context::new(),
        };

        match self.tera.render(kind, &context) {
            Ok(body) => body,
            Err(e) => {
                warn!(kind = %kind, "Template missing or broken, using generic body: {:?}", e);
                self.tera
                    .render(GENERIC_TEMPLATE, &context)
                    .unwrap_or_else(|_| "You have an update regarding your application.".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_known_kind() {
        let renderer = MessageRenderer::with_default_templates();
        let body = renderer.render("booking-confirmed", &json!({
            "candidate_name": "Ada",
            "event_title": "Interview",
            "start_time": "2026-09-01 10:00",
        }));
        assert!(body.contains("Ada"));
        assert!(body.contains("Interview"));
    }

    #[test]
    fn unknown_kind_falls_back_to_generic() {
        let renderer = MessageRenderer::with_default_templates();
        let body = renderer.render("no-such-kind", &json!({}));
        assert!(!body.is_empty());
    }

    #[test]
    fn non_object_payload_does_not_panic() {
        let renderer = MessageRenderer::with_default_templates();
        let body = renderer.render("booking-confirmed", &json!("scalar"));
        assert!(!body.is_empty());
    }
}
