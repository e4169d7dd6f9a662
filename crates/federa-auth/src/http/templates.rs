//! Server-rendered pages for the credential login flow.

use crate::login::{FieldSpec, FormErrors, FormSpec};

const STYLES: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f7;
    color: #1d1f24;
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
    line-height: 1.5;
}
.container { width: 100%; max-width: 400px; padding: 1rem; }
.card {
    background: #fff;
    border: 1px solid #dde0e6;
    border-radius: 8px;
    padding: 1.75rem;
}
.card-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 1.25rem; }
.form-group { margin-bottom: 1rem; }
.form-label { display: block; font-size: 0.875rem; margin-bottom: 0.375rem; }
.form-input {
    width: 100%;
    padding: 0.625rem 0.75rem;
    border: 1px solid #c4c8d0;
    border-radius: 6px;
    font-size: 1rem;
}
.field-error { color: #b3261e; font-size: 0.8125rem; margin-top: 0.25rem; }
.alert-error {
    background: #fdecea;
    color: #b3261e;
    border-radius: 6px;
    padding: 0.75rem;
    margin-bottom: 1rem;
    font-size: 0.875rem;
}
.btn {
    width: 100%;
    padding: 0.7rem;
    border: none;
    border-radius: 6px;
    background: #0b5cad;
    color: #fff;
    font-size: 1rem;
    cursor: pointer;
}
.error-code { color: #6c717a; font-family: monospace; margin-top: 0.75rem; }
"#;

fn html_page(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 1600);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str(" - Federa</title>\n    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str(content);
    html.push_str("\n    </div>\n</body>\n</html>");
    html
}

/// Renders a credential backend's login form.
///
/// `identifier` refills the identifier input after a failed submit. The
/// secret is never echoed back.
pub fn render_credential_form(
    form: &FormSpec,
    identifier: Option<&str>,
    errors: &FormErrors,
) -> String {
    let mut content = String::with_capacity(2048);

    content.push_str("<div class=\"card\">\n<div class=\"card-title\">");
    content.push_str(&html_escape(&form.title));
    content.push_str("</div>\n\n");

    if let Some(general) = &errors.general {
        content.push_str("<div class=\"alert-error\">");
        content.push_str(&html_escape(general));
        content.push_str("</div>\n\n");
    }

    content.push_str("<form method=\"POST\">\n");
    push_field(&mut content, &form.identifier, "text", identifier, errors);
    push_field(&mut content, &form.secret, "password", None, errors);
    content.push_str("<button type=\"submit\" class=\"btn\">Log in</button>\n");
    content.push_str("</form>\n</div>");

    html_page(&form.title, &content)
}

fn push_field(
    content: &mut String,
    field: &FieldSpec,
    input_type: &str,
    value: Option<&str>,
    errors: &FormErrors,
) {
    let name = html_escape(&field.name);
    content.push_str("<div class=\"form-group\">\n");
    content.push_str(&format!(
        "<label class=\"form-label\" for=\"{name}\">{}</label>\n",
        html_escape(&field.label)
    ));
    content.push_str(&format!(
        "<input type=\"{input_type}\" id=\"{name}\" name=\"{name}\" class=\"form-input\" required"
    ));
    if let Some(max) = field.max_length {
        content.push_str(&format!(" maxlength=\"{max}\""));
    }
    if let Some(value) = value {
        content.push_str(" value=\"");
        content.push_str(&html_escape(value));
        content.push('"');
    }
    content.push_str(">\n");
    for message in errors.for_field(&field.name) {
        content.push_str("<div class=\"field-error\">");
        content.push_str(&html_escape(message));
        content.push_str("</div>\n");
    }
    content.push_str("</div>\n\n");
}

/// Renders a generic error page.
pub fn render_error_page(error_code: &str, message: &str) -> String {
    let mut content = String::with_capacity(512);
    content.push_str("<div class=\"card\" style=\"text-align: center;\">\n");
    content.push_str("<div class=\"card-title\">Login failed</div>\n<div>");
    content.push_str(&html_escape(message));
    content.push_str("</div>\n<div class=\"error-code\">");
    content.push_str(&html_escape(error_code));
    content.push_str("</div>\n</div>");

    html_page("Error", &content)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
