//! Jinja templates for notification subjects and bodies
//!
//! Templates see the alert as one flat object: the named fields plus every
//! extra field, so `{{ severity | upper }}`, `{{ details.host }}` and
//! `{% if severity == 'high' %}` all work. Unknown fields render as empty
//! text.

use minijinja::Environment;

use super::record::AlertRecord;

const TEMPLATE_NAME: &str = "alert";

/// A compiled notification template
#[derive(Clone)]
pub struct Template {
    env: Environment<'static>,
    source: String,
}

impl Template {
    /// Compile a template, failing on syntax errors
    pub fn new(source: impl Into<String>) -> Result<Self, minijinja::Error> {
        let source = source.into();
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source.clone())?;
        Ok(Self { env, source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, alert: &AlertRecord) -> Result<String, minijinja::Error> {
        self.env.get_template(TEMPLATE_NAME)?.render(alert)
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::record::normalize;
    use serde_json::{json, Value};

    fn alert(value: Value) -> AlertRecord {
        normalize(value.as_object().cloned().unwrap(), chrono::Utc::now()).unwrap()
    }

    fn render(source: &str, alert: &AlertRecord) -> String {
        Template::new(source).unwrap().render(alert).unwrap()
    }

    #[test]
    fn test_render_named_fields_with_filters() {
        let alert = alert(json!({
            "severity": "high",
            "message": "x",
            "event_type": "intrusion"
        }));

        assert_eq!(
            render("SecuriWatch Alert: {{ severity | upper }} - {{event_type}}", &alert),
            "SecuriWatch Alert: HIGH - intrusion"
        );
    }

    #[test]
    fn test_render_extra_and_nested_fields() {
        let alert = alert(json!({
            "severity": "low",
            "message": "x",
            "rule_id": 4012,
            "blocked": true,
            "details": {"host": "db-01"}
        }));

        assert_eq!(
            render("{{ rule_id }}/{{ blocked }}/{{ details.host | upper }}", &alert),
            "4012/true/DB-01"
        );
    }

    #[test]
    fn test_conditionals_and_default_filter() {
        let source = "{% if severity == 'high' %}URGENT {% endif %}{{ host | default('n/a') }}";

        let high = alert(json!({"severity": "high", "message": "x"}));
        assert_eq!(render(source, &high), "URGENT n/a");

        let low = alert(json!({"severity": "low", "message": "x", "host": "web-02"}));
        assert_eq!(render(source, &low), "web-02");
    }

    #[test]
    fn test_unknown_field_renders_empty() {
        let alert = alert(json!({"severity": "medium", "message": "disk full"}));

        assert_eq!(
            render("[{{ nope }}] {{ message }} {{ severity | title }}", &alert),
            "[] disk full Medium"
        );
    }

    #[test]
    fn test_syntax_error_rejected() {
        assert!(Template::new("{% if severity %}unterminated").is_err());
        assert!(Template::new("{{ severity ").is_err());
    }

    #[test]
    fn test_text_without_placeholders_untouched() {
        let alert = alert(json!({"severity": "high", "message": "x"}));

        assert_eq!(
            render("<p>{ not a placeholder }</p>", &alert),
            "<p>{ not a placeholder }</p>"
        );
    }
}
