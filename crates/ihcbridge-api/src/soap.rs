// SOAP 1.1 envelope construction and response inspection.
//
// The controller's responses are namespaced (`ns1:`, `ns2:`, ...) with
// prefixes that vary between firmware releases, so lookups match on the
// local element name only.

use roxmltree::{Document, Node};

use crate::error::Error;

pub(crate) const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Wrap a body fragment in a SOAP envelope.
pub(crate) fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <s:Envelope xmlns:s=\"{SOAP_ENV_NS}\"><s:Body>{body}</s:Body></s:Envelope>"
    )
}

/// Escape text for inclusion as XML character data.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Parse a response body, turning a SOAP `Fault` into [`Error::Fault`].
pub(crate) fn parse_response<'input>(
    action: &str,
    body: &'input str,
) -> Result<Document<'input>, Error> {
    let doc = Document::parse(body).map_err(|e| Error::Deserialization {
        action: action.to_owned(),
        message: e.to_string(),
        body: body.to_owned(),
    })?;

    if let Some(fault) = find_element(doc.root(), "Fault") {
        let message = find_element(fault, "faultstring")
            .and_then(|n| n.text())
            .map_or_else(|| "unspecified fault".to_owned(), |t| t.trim().to_owned());
        return Err(Error::Fault {
            action: action.to_owned(),
            message,
        });
    }

    Ok(doc)
}

/// First descendant element (including `node` itself) with the given local name.
pub(crate) fn find_element<'a, 'input>(
    node: Node<'a, 'input>,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local)
}

/// First direct child element with the given local name.
pub(crate) fn child_element<'a, 'input>(
    node: Node<'a, 'input>,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == local)
}

/// Trimmed text of the first element with the given local name.
pub(crate) fn element_text<'a>(doc: &'a Document<'_>, local: &str) -> Option<&'a str> {
    find_element(doc.root(), local)
        .and_then(|n| n.text())
        .map(str::trim)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn envelope_wraps_body() {
        let env = envelope("<ping/>");
        assert!(env.contains("<s:Body><ping/></s:Body>"));
        assert!(env.starts_with("<?xml"));
    }

    #[test]
    fn fault_is_reported() {
        let body = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
            <SOAP-ENV:Body><SOAP-ENV:Fault>
              <faultcode>SOAP-ENV:Server</faultcode>
              <faultstring> not logged in </faultstring>
            </SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;
        let err = parse_response("getIHCProject", body).unwrap_err();
        match err {
            Error::Fault { action, message } => {
                assert_eq!(action, "getIHCProject");
                assert_eq!(message, "not logged in");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn lookup_ignores_namespace_prefix() {
        let body = r#"<a:Envelope xmlns:a="x" xmlns:ns1="utcs"><a:Body>
            <ns1:authenticate2><ns1:loginWasSuccessful>true</ns1:loginWasSuccessful></ns1:authenticate2>
            </a:Body></a:Envelope>"#;
        let doc = parse_response("authenticate", body).unwrap();
        assert_eq!(element_text(&doc, "loginWasSuccessful"), Some("true"));
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        let err = parse_response("authenticate", "<<not xml").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }
}
