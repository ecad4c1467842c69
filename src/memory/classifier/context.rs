/*!
 * Call Context
 * Opaque descriptor handed to the classifier
 */

use std::borrow::Cow;
use std::panic::Location;

/// Call-site fingerprint describing where an allocation came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CallContext<'a> {
    fingerprint: Cow<'a, str>,
}

impl<'a> CallContext<'a> {
    pub fn new(fingerprint: &'a str) -> Self {
        Self {
            fingerprint: Cow::Borrowed(fingerprint),
        }
    }

    /// Missing context; classifiers map it to their default class
    pub fn none() -> Self {
        Self::default()
    }

    /// Fingerprint of the caller's source location (`file:line:column`)
    #[track_caller]
    pub fn here() -> CallContext<'static> {
        let location = Location::caller();
        CallContext {
            fingerprint: Cow::Owned(format!(
                "{}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            )),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.fingerprint
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_empty()
    }
}

impl<'a> From<&'a str> for CallContext<'a> {
    fn from(fingerprint: &'a str) -> Self {
        Self::new(fingerprint)
    }
}

impl From<String> for CallContext<'static> {
    fn from(fingerprint: String) -> Self {
        Self {
            fingerprint: Cow::Owned(fingerprint),
        }
    }
}

impl<'a> From<&'a String> for CallContext<'a> {
    fn from(fingerprint: &'a String) -> Self {
        Self::new(fingerprint.as_str())
    }
}

impl std::fmt::Display for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<none>")
        } else {
            write!(f, "{}", self.fingerprint)
        }
    }
}
