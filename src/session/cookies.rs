//! Session cookie parsing and merging

use serde::{Deserialize, Serialize};

/// One cookie received via `set-cookie`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Raw attributes (`Path=/`, `HttpOnly`, ...) in received order
    pub attributes: Vec<String>,
}

impl Cookie {
    /// Parse a `set-cookie` value. Returns `None` when there is no `name=`.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let pair = parts.next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            attributes: parts
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Server asked to delete the cookie (`Max-Age=0` or negative)
    pub fn is_removal(&self) -> bool {
        self.attributes.iter().any(|attr| {
            attr.split_once('=')
                .filter(|(k, _)| k.trim().eq_ignore_ascii_case("max-age"))
                .and_then(|(_, v)| v.trim().parse::<i64>().ok())
                .is_some_and(|age| age <= 0)
        })
    }
}

/// Ordered cookie set keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name, keeping first-seen order; removal cookies drop the entry.
    pub fn merge(&mut self, cookie: Cookie) {
        let existing = self.cookies.iter().position(|c| c.name == cookie.name);
        match (existing, cookie.is_removal()) {
            (Some(idx), true) => {
                self.cookies.remove(idx);
            }
            (Some(idx), false) => self.cookies[idx] = cookie,
            (None, true) => {}
            (None, false) => self.cookies.push(cookie),
        }
    }

    /// `Cookie` header value (`a=1; b=2`), or `None` when empty
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.iter().any(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
}

/// Names of the cookies in a request `Cookie` header
pub fn cookie_names(header: &str) -> Vec<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_attributes() {
        let cookie =
            Cookie::parse("SAP_SESSIONID_ABC_100=xyz=123; path=/; secure; HttpOnly").unwrap();
        assert_eq!(cookie.name, "SAP_SESSIONID_ABC_100");
        assert_eq!(cookie.value, "xyz=123");
        assert_eq!(cookie.attributes, vec!["path=/", "secure", "HttpOnly"]);
        assert!(!cookie.is_removal());
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        assert!(Cookie::parse("=value").is_none());
        assert!(Cookie::parse("novalue").is_none());
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let mut jar = CookieJar::new();
        jar.merge(Cookie::parse("a=1").unwrap());
        jar.merge(Cookie::parse("b=2").unwrap());
        jar.merge(Cookie::parse("a=3").unwrap());

        assert_eq!(jar.header_value().as_deref(), Some("a=3; b=2"));
    }

    #[test]
    fn test_removal_cookie() {
        let mut jar = CookieJar::new();
        jar.merge(Cookie::parse("a=1").unwrap());
        jar.merge(Cookie::parse("a=; Max-Age=0").unwrap());
        jar.merge(Cookie::parse("b=; max-age=0").unwrap());

        assert!(jar.is_empty());
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn test_cookie_names() {
        assert_eq!(cookie_names("a=1; b=2;c=3"), vec!["a", "b", "c"]);
    }
}
