//! SOAP 1.2 envelopes with WS-Security UsernameToken authentication.

use base64::Engine;
use sha1::{Digest, Sha1};
use std::time::Duration;

use super::xml;

pub const CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

const NAMESPACES: &str = concat!(
    r#"xmlns:s="http://www.w3.org/2003/05/soap-envelope" "#,
    r#"xmlns:tds="http://www.onvif.org/ver10/device/wsdl" "#,
    r#"xmlns:trt="http://www.onvif.org/ver10/media/wsdl" "#,
    r#"xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl" "#,
    r#"xmlns:tt="http://www.onvif.org/ver10/schema""#,
);

/// Build a complete request envelope authenticated as `username`.
pub fn envelope(username: &str, password: &str, body: &str) -> String {
    let nonce: [u8; 16] = rand::random();
    let created = chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    let header = security_header(username, password, &nonce, &created);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope {NAMESPACES}>{header}<s:Body>{body}</s:Body></s:Envelope>"#
    )
}

/// Password digest is Base64(SHA1(nonce + created + password)).
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn security_header(username: &str, password: &str, nonce: &[u8], created: &str) -> String {
    let digest = password_digest(nonce, created, password);
    let nonce = base64::engine::general_purpose::STANDARD.encode(nonce);
    format!(
        concat!(
            r#"<s:Header><Security s:mustUnderstand="1" "#,
            r#"xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">"#,
            "<UsernameToken><Username>{}</Username>",
            r#"<Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</Password>"#,
            r#"<Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>"#,
            r#"<Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>"#,
            "</UsernameToken></Security></s:Header>"
        ),
        xml::escape(username),
        digest,
        nonce,
        created
    )
}

/// Human-readable reason of a SOAP fault, if the body is one.
pub fn fault_reason(body: &str) -> Option<String> {
    let fault = xml::section(body, "Fault")?;
    xml::section(fault, "Reason")
        .and_then(|reason| xml::element_text(reason, "Text"))
        .or_else(|| xml::element_text(fault, "faultstring"))
        .or_else(|| {
            xml::section(fault, "Subcode").and_then(|code| xml::element_text(code, "Value"))
        })
        .or_else(|| Some("unspecified SOAP fault".to_string()))
}

/// `xs:duration` rendering of whole seconds, e.g. `PT1S`.
pub fn xs_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("PT{}S", millis / 1000)
    } else {
        format!("PT{}.{:03}S", millis / 1000, millis % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_digest_known_vector() {
        // WS-Security UsernameToken profile example values
        let nonce = base64::engine::general_purpose::STANDARD
            .decode("LKqI6G/AikKCQrN0zqZFlg==")
            .unwrap();
        let digest = password_digest(&nonce, "2010-09-16T07:50:45Z", "userpassword");
        assert_eq!(digest, "tuOSpGlFlIXsozq4HFNeeGeFLEI=");
    }

    #[test]
    fn test_envelope_structure() {
        let envelope = envelope("admin", "secret", "<tds:GetCapabilities/>");
        assert!(envelope.contains("PasswordDigest"));
        assert!(envelope.contains("<Username>admin</Username>"));
        assert!(envelope.contains("<s:Body><tds:GetCapabilities/></s:Body>"));
        assert!(!envelope.contains("secret"));
    }

    #[test]
    fn test_username_is_escaped() {
        let envelope = envelope("a<b", "pw", "");
        assert!(envelope.contains("<Username>a&lt;b</Username>"));
    }

    #[test]
    fn test_fault_reason_soap12() {
        let body = r#"<env:Envelope><env:Body><env:Fault>
            <env:Code><env:Value>env:Sender</env:Value>
              <env:Subcode><env:Value>ter:NotAuthorized</env:Value></env:Subcode></env:Code>
            <env:Reason><env:Text xml:lang="en">Sender not Authorized</env:Text></env:Reason>
            </env:Fault></env:Body></env:Envelope>"#;
        assert_eq!(fault_reason(body).as_deref(), Some("Sender not Authorized"));
    }

    #[test]
    fn test_fault_reason_absent() {
        let body = "<s:Envelope><s:Body><tptz:StopResponse/></s:Body></s:Envelope>";
        assert!(fault_reason(body).is_none());
    }

    #[test]
    fn test_xs_duration() {
        assert_eq!(xs_duration(Duration::from_secs(1)), "PT1S");
        assert_eq!(xs_duration(Duration::from_millis(1500)), "PT1.500S");
    }
}
