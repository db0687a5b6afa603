//! Namespace-agnostic lookups over SOAP response bodies.
//!
//! ONVIF devices disagree on namespace prefixes (`tt:`, `tds:`, `ns2:` or
//! none), so elements are matched by local name only.

use std::borrow::Cow;

/// Find the first opening tag whose local name is `name`.
///
/// Returns the tag text between `<` and `>` and the offset just past `>`.
fn find_open_tag<'a>(xml: &'a str, name: &str) -> Option<(&'a str, usize)> {
    let mut offset = 0;
    while let Some(pos) = xml[offset..].find('<') {
        let start = offset + pos + 1;
        let end = xml[start..].find('>')?;
        let tag = &xml[start..start + end];
        offset = start + end + 1;

        if tag.starts_with(['/', '?', '!']) {
            continue;
        }
        let qualified = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        let local = qualified.rsplit(':').next().unwrap_or(qualified);
        if local == name {
            return Some((tag, offset));
        }
    }
    None
}

fn qualified_name(tag: &str) -> &str {
    tag.split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
}

/// Text content of the first leaf element named `name`.
pub fn element_text(xml: &str, name: &str) -> Option<String> {
    let (tag, after) = find_open_tag(xml, name)?;
    if tag.ends_with('/') {
        return None;
    }
    let rest = &xml[after..];
    let end = rest.find("</")?;
    let value = unescape(rest[..end].trim());
    (!value.is_empty()).then_some(value)
}

/// Value of `attr` on the first element named `name`.
pub fn element_attribute(xml: &str, name: &str, attr: &str) -> Option<String> {
    let (tag, _) = find_open_tag(xml, name)?;
    let needle = format!("{attr}=");
    let mut search = 0;
    while let Some(pos) = tag[search..].find(needle.as_str()) {
        let at = search + pos;
        search = at + needle.len();
        let preceded_by_space = tag[..at].ends_with(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }
        let value = &tag[search..];
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let close = value[1..].find(quote)?;
        return Some(unescape(&value[1..=close]));
    }
    None
}

/// Inner markup of the first element named `name`.
pub fn section<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let (tag, after) = find_open_tag(xml, name)?;
    if tag.ends_with('/') {
        return Some("");
    }
    let close = format!("</{}>", qualified_name(tag));
    let end = xml[after..].find(close.as_str())?;
    Some(&xml[after..after + end])
}

/// Escape `text` for element content or attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Resolve entity and character references; text with a malformed reference
/// is returned as is.
pub fn unescape(text: &str) -> String {
    quick_xml::escape::unescape(text).map_or_else(|_| text.to_string(), Cow::into_owned)
}
