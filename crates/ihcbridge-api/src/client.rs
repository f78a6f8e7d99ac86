// IHC controller SOAP client
//
// Wraps `reqwest::Client` with the controller's service URL layout,
// SOAP envelope construction, and response decoding. The login session
// lives in the cookie jar, so one client must be used for the whole
// session.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::soap::{self, element_text};
use crate::transport::TransportConfig;
use crate::values::{self, ResourceValue};

const AUTHENTICATION_SERVICE: &str = "AuthenticationService";
const CONTROLLER_SERVICE: &str = "ControllerService";
const RESOURCE_SERVICE: &str = "ResourceInteractionService";

/// Application name the controller expects in the login request.
const LOGIN_APPLICATION: &str = "treeview";

/// Raw SOAP client for the IHC controller.
///
/// All methods return decoded payloads -- SOAP envelopes and faults are
/// handled before the caller sees anything.
pub struct IhcClient {
    http: reqwest::Client,
    base_url: Url,
}

impl IhcClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// If the config doesn't already include a cookie jar, one is created
    /// automatically (the login session is cookie based). `base_url` is
    /// the controller root, e.g. `https://192.168.1.100`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let http = config.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Services ─────────────────────────────────────────────────────

    /// Log in with username/password.
    ///
    /// Returns `Ok(false)` when the controller answers but rejects the
    /// credentials; transport and protocol problems are errors.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<bool, Error> {
        let body = format!(
            "<authenticate1 xmlns=\"utcs\" xmlns:i=\"http://www.w3.org/2001/XMLSchema-instance\">\
             <password>{}</password><username>{}</username>\
             <application>{LOGIN_APPLICATION}</application></authenticate1>",
            soap::escape(password.expose_secret()),
            soap::escape(username),
        );

        debug!(url = %self.base_url, username, "authenticating");
        let text = self
            .call(AUTHENTICATION_SERVICE, "authenticate", &body)
            .await?;
        let doc = soap::parse_response("authenticate", &text)?;

        let ok = element_text(&doc, "loginWasSuccessful") == Some("true");
        debug!(success = ok, "authentication answered");
        Ok(ok)
    }

    /// Download the project description as XML text.
    ///
    /// The controller ships it base64 encoded and gzip compressed, in
    /// ISO-8859-1.
    pub async fn project(&self) -> Result<String, Error> {
        let text = self.call(CONTROLLER_SERVICE, "getIHCProject", "").await?;
        let doc = soap::parse_response("getIHCProject", &text)?;

        let data = element_text(&doc, "data").ok_or_else(|| Error::Deserialization {
            action: "getIHCProject".into(),
            message: "response has no data element".into(),
            body: text.clone(),
        })?;

        let xml = decode_project(data)?;
        debug!(bytes = xml.len(), "project downloaded");
        Ok(xml)
    }

    /// Set a boolean runtime value. Returns the controller's acknowledgement.
    pub async fn set_bool(&self, resource_id: u32, value: bool) -> Result<bool, Error> {
        let body = format!(
            "<setResourceValue1 xmlns=\"utcs\" xmlns:i=\"http://www.w3.org/2001/XMLSchema-instance\">\
             <value i:type=\"a:WSBooleanValue\" xmlns:a=\"utcs.values\"><a:value>{value}</a:value></value>\
             <typeString/><resourceID>{resource_id}</resourceID>\
             <isValueRuntime>true</isValueRuntime></setResourceValue1>"
        );

        trace!(resource_id, value, "setResourceValue");
        let text = self
            .call(RESOURCE_SERVICE, "setResourceValue", &body)
            .await?;
        let doc = soap::parse_response("setResourceValue", &text)?;
        Ok(element_text(&doc, "setResourceValue2") == Some("true"))
    }

    /// Ask the controller to report changes of the given resources.
    ///
    /// The current values of newly enabled resources are reported by the
    /// next [`wait_for_changes`](Self::wait_for_changes) call.
    pub async fn enable_notifications(&self, resource_ids: &[u32]) -> Result<(), Error> {
        use std::fmt::Write;

        let items = resource_ids.iter().fold(String::new(), |mut acc, id| {
            let _ = write!(acc, "<a:arrayItem>{id}</a:arrayItem>");
            acc
        });
        let body = format!(
            "<enableRuntimeValueNotifications1 xmlns=\"utcs\" \
             xmlns:a=\"http://www.w3.org/2001/XMLSchema\" \
             xmlns:i=\"http://www.w3.org/2001/XMLSchema-instance\">{items}\
             </enableRuntimeValueNotifications1>"
        );

        debug!(count = resource_ids.len(), "enabling runtime value notifications");
        let text = self
            .call(RESOURCE_SERVICE, "enableRuntimeValueNotifications", &body)
            .await?;
        soap::parse_response("enableRuntimeValueNotifications", &text)?;
        Ok(())
    }

    /// Long-poll for value changes of enabled resources.
    ///
    /// Blocks server-side for up to `wait_secs` seconds and returns an
    /// empty batch if nothing changed.
    pub async fn wait_for_changes(&self, wait_secs: u32) -> Result<Vec<ResourceValue>, Error> {
        let body = format!(
            "<waitForResourceValueChanges1 xmlns=\"utcs\">{wait_secs}</waitForResourceValueChanges1>"
        );
        let text = self
            .call(RESOURCE_SERVICE, "waitForResourceValueChanges", &body)
            .await?;
        let doc = soap::parse_response("waitForResourceValueChanges", &text)?;
        let changes = values::parse_value_items(&doc);
        trace!(count = changes.len(), "value changes received");
        Ok(changes)
    }

    // ── Transport ────────────────────────────────────────────────────

    fn service_url(&self, service: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/ws/{service}"))?)
    }

    /// POST one SOAP action and return the raw response body.
    async fn call(&self, service: &str, action: &str, body: &str) -> Result<String, Error> {
        let url = self.service_url(service)?;
        debug!("POST {} ({})", url, action);

        let resp = self
            .http
            .post(url)
            .header("SOAPAction", action)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .body(soap::envelope(body))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("{action} refused (HTTP {status})"),
            });
        }

        // Faults come back as HTTP 500 with a parseable envelope.
        let text = resp.text().await?;
        if !status.is_success() && !text.contains("Fault") {
            return Err(Error::Http {
                action: action.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(text)
    }
}

/// Base64 → gzip → ISO-8859-1 text.
fn decode_project(data: &str) -> Result<String, Error> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let compressed = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::ProjectDecode(format!("base64: {e}")))?;

    let mut raw = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(|e| Error::ProjectDecode(format!("gzip: {e}")))?;

    // ISO-8859-1 maps byte-for-byte onto the first 256 code points.
    Ok(raw.into_iter().map(char::from).collect())
}
