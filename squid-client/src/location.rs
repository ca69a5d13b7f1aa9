//! Reading parameters from the host's current location.

/// Source of the current location's parameters.
pub trait LocationSource: Send + Sync {
    /// Value of `name`, or `None` when absent or empty.
    fn param(&self, name: &str) -> Option<String>;
}

/// A location given as a full href, e.g. the page URL of a browser host.
///
/// Parameters are found by text search for `name=` and run until the next
/// `&`, `#` or the end of the href. Values are returned as they appear,
/// without percent-decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationHref {
    href: String,
}

impl LocationHref {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// The href with `name=value` removed, along with the `&` before it.
    pub fn clear_param(&self, name: &str) -> String {
        let Some(start) = self.find(name) else {
            return self.href.clone();
        };
        let cut = if self.href[..start].ends_with('&') {
            start - 1
        } else {
            start
        };
        let end = self.value_end(start + name.len() + 1);

        let mut cleared = String::with_capacity(self.href.len());
        cleared.push_str(&self.href[..cut]);
        cleared.push_str(&self.href[end..]);
        cleared
    }

    /// Same location without `name`.
    pub fn without_param(&self, name: &str) -> Self {
        Self::new(self.clear_param(name))
    }

    // Matches at offset 0 are ignored: a parameter is always preceded by a
    // delimiter in a real href.
    fn find(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.href
            .find(&format!("{name}="))
            .filter(|idx| *idx > 0)
    }

    fn value_end(&self, from: usize) -> usize {
        self.href[from..]
            .find(['&', '#'])
            .map(|offset| from + offset)
            .unwrap_or(self.href.len())
    }
}

impl LocationSource for LocationHref {
    fn param(&self, name: &str) -> Option<String> {
        let start = self.find(name)? + name.len() + 1;
        let end = self.value_end(start);
        let value = &self.href[start..end];
        (!value.is_empty()).then(|| value.to_string())
    }
}
