// ============================
// crates/autologin-lib/src/auth/transport.rs
// ============================
//! Cookie transport: how the auth core reads and writes cookies by name.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Get/set access to the cookies of one request
pub trait CookieTransport: Send + Sync {
    fn get_cookie(&self, name: &str) -> Option<String>;

    /// A zero `max_age` removes the cookie
    fn set_cookie(&self, name: &str, value: &str, max_age: Duration);
}

/// A cookie write waiting to be sent back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
}

/// Attributes applied to every rendered `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    pub secure: bool,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            secure: false,
        }
    }
}

impl SetCookie {
    pub fn is_removal(&self) -> bool {
        self.max_age.is_zero()
    }

    /// Render as a `Set-Cookie` header value
    pub fn header_value(&self, attributes: &CookieAttributes) -> String {
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name,
            self.value,
            attributes.path,
            self.max_age.as_secs()
        );
        if attributes.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Request cookies in, pending `Set-Cookie`s out.
///
/// Reads observe writes made earlier in the same request, so a logout that
/// follows a rotation revokes the rotated token rather than the stale one.
#[derive(Debug, Default)]
pub struct CookieJar {
    incoming: HashMap<String, String>,
    outgoing: Mutex<Vec<SetCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` request header (`a=1; b=2`)
    pub fn from_header(header: &str) -> Self {
        let incoming = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect();
        Self {
            incoming,
            outgoing: Mutex::new(Vec::new()),
        }
    }

    /// Builder-style helper for seeding a request cookie
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.incoming.insert(name.to_string(), value.to_string());
        self
    }

    /// Pending writes, latest write per cookie name, in first-write order
    pub fn pending(&self) -> Vec<SetCookie> {
        let outgoing = self.outgoing.lock();
        let mut latest: Vec<SetCookie> = Vec::new();
        for cookie in outgoing.iter() {
            match latest.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => *existing = cookie.clone(),
                None => latest.push(cookie.clone()),
            }
        }
        latest
    }

    /// Latest pending write for one cookie
    pub fn pending_for(&self, name: &str) -> Option<SetCookie> {
        self.outgoing
            .lock()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn header_values(&self, attributes: &CookieAttributes) -> Vec<String> {
        self.pending()
            .iter()
            .map(|c| c.header_value(attributes))
            .collect()
    }
}

impl CookieTransport for CookieJar {
    fn get_cookie(&self, name: &str) -> Option<String> {
        if let Some(written) = self.pending_for(name) {
            return (!written.is_removal()).then_some(written.value);
        }
        self.incoming.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) {
        self.outgoing.lock().push(SetCookie {
            name: name.to_string(),
            value: value.to_string(),
            max_age,
        });
    }
}
