//! Billing email templates.
//!
//! Workspaces configure subject and body strings with `{{token}}`
//! placeholders. Rendering is a single left-to-right pass: substituted
//! values are never rescanned, so a company called `{{total}}` stays
//! literal. Unknown tokens are kept as written.

use super::document::ProformaDocument;
use super::format::{format_money, month_name};

pub const DEFAULT_SUBJECT: &str = "Proforma {{number}} - {{company}} - {{month}} {{year}}";

pub const DEFAULT_BODY: &str = "<p>Dear {{company}},</p>\
<p>Please find attached proforma <strong>{{number}}</strong> for {{month}} {{year}}, \
for a total of <strong>{{total}}</strong>.</p>\
<p>Tax ID on file: {{tax_id}}</p>\
<p>Kind regards,<br>{{provider}}</p>";

/// Values available to billing templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub company: String,
    pub month: String,
    pub year: String,
    pub number: String,
    pub total: String,
    pub provider: String,
    pub tax_id: String,
}

impl TemplateVars {
    pub fn for_document(doc: &ProformaDocument, company_name: &str, month: u32, year: i32) -> Self {
        Self {
            company: company_name.to_string(),
            month: month_name(month).to_string(),
            year: year.to_string(),
            number: doc.number.clone(),
            total: format!("{} {}", doc.currency, format_money(doc.totals.total)),
            provider: doc.provider.name.clone(),
            tax_id: doc.client.tax_id.clone().unwrap_or_default(),
        }
    }

    fn lookup(&self, token: &str) -> Option<&str> {
        match token {
            "company" => Some(&self.company),
            "month" => Some(&self.month),
            "year" => Some(&self.year),
            "number" => Some(&self.number),
            "total" => Some(&self.total),
            "provider" => Some(&self.provider),
            "tax_id" => Some(&self.tax_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    None,
    Html,
}

/// Substitute `{{token}}` placeholders in one pass.
pub fn render(template: &str, vars: &TemplateVars, escape: Escape) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let token = after_open[..end].trim();
        match vars.lookup(token) {
            Some(value) => match escape {
                Escape::None => out.push_str(value),
                Escape::Html => push_html_escaped(&mut out, value),
            },
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Render subject and HTML body, falling back to the defaults.
pub fn render_email(
    subject: Option<&str>,
    body: Option<&str>,
    vars: &TemplateVars,
) -> (String, String) {
    let subject_template = subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SUBJECT);
    let body_template = body.filter(|b| !b.trim().is_empty()).unwrap_or(DEFAULT_BODY);

    (
        render(subject_template, vars, Escape::None),
        render(body_template, vars, Escape::Html),
    )
}

fn push_html_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}
