use askama::Template;

use idp_slo::{errors, Result};

/// RedirectForm posts the encoded response to the SP's assertion consumer.
///
/// Every value is HTML escaped on the way into the document; relay state is
/// otherwise passed along exactly as received.
#[derive(Template, Debug, Clone, Default, PartialEq, Eq)]
#[template(path = "redirect_form.html")]
pub struct RedirectForm {
    pub form_action: String,
    pub relay_state: String,
    pub saml_response: String,
}

impl RedirectForm {
    pub fn render_bytes(&self) -> Result<Vec<u8>> {
        self.render().map(String::into_bytes).map_err(|err| {
            errors::template(&format!("failed to build form: {err}"))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Value of the hidden input `name`, with entities resolved.
    pub(crate) fn field(html: &str, name: &str) -> Option<String> {
        let marker = format!("name=\"{name}\" value=\"");
        let start = html.find(&marker)? + marker.len();
        let end = start + html[start..].find('"')?;
        Some(unescape(&html[start..end]))
    }

    pub(crate) fn action(html: &str) -> Option<String> {
        let marker = "action=\"";
        let start = html.find(marker)? + marker.len();
        let end = start + html[start..].find('"')?;
        Some(unescape(&html[start..end]))
    }

    fn unescape(s: &str) -> String {
        s.replace("&#x2f;", "/")
            .replace("&#x27;", "'")
            .replace("&quot;", "\"")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
    }

    fn form(relay_state: &str) -> RedirectForm {
        RedirectForm {
            form_action: "https://sp.example.com/saml/acs".to_owned(),
            relay_state: relay_state.to_owned(),
            saml_response: "PHNhbWxwOlJlc3BvbnNlLz4=".to_owned(),
        }
    }

    #[test]
    fn render_without_relay_state() {
        let html = String::from_utf8(form("").render_bytes().unwrap()).unwrap();
        assert!(html.contains("method=\"post\""));
        assert!(!html.contains("RelayState"));
        assert_eq!(
            action(&html).as_deref(),
            Some("https://sp.example.com/saml/acs")
        );
        assert_eq!(
            field(&html, "SAMLResponse").as_deref(),
            Some("PHNhbWxwOlJlc3BvbnNlLz4=")
        );
        assert!(html.contains(".submit();"));
        assert!(html.contains("type=\"submit\""));
    }

    #[test]
    fn render_with_relay_state() {
        let html =
            String::from_utf8(form("xyz").render_bytes().unwrap()).unwrap();
        assert!(html.contains("name=\"RelayState\" value=\"xyz\""));
        assert_eq!(field(&html, "RelayState").as_deref(), Some("xyz"));
    }

    #[test]
    fn render_escapes_dynamic_values() {
        let mut f = form("<script>alert(\"x\")</script>");
        f.form_action = "https://sp.example.com/acs?a=1&b=\"2\"".to_owned();
        let html = String::from_utf8(f.render_bytes().unwrap()).unwrap();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert_eq!(
            field(&html, "RelayState").as_deref(),
            Some("<script>alert(\"x\")</script>")
        );
        assert_eq!(
            action(&html).as_deref(),
            Some("https://sp.example.com/acs?a=1&b=\"2\"")
        );
    }
}
