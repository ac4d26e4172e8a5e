//! Signature-based payload filtering.
//!
//! Signatures are an ordered list evaluated first-to-last against the URL,
//! its decoded query, and the body. The first hit rejects the request.

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use crate::config::SignatureConfig;
use crate::security::request::GuardRequest;
use crate::security::verdict::{Denial, Verdict};

#[derive(Debug, Clone)]
pub struct Signature {
    id: String,
    regex: Regex,
}

impl Signature {
    pub fn new(id: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            regex: RegexBuilder::new(pattern).case_insensitive(true).build()?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

/// Ordered, appendable signature list.
#[derive(Debug, Clone, Default)]
pub struct SignatureSet {
    signatures: Vec<Signature>,
}

impl SignatureSet {
    pub fn from_config(list: &[SignatureConfig]) -> Result<Self, (String, regex::Error)> {
        let mut set = Self::default();
        for sig in list {
            set.push(&sig.id, &sig.pattern).map_err(|e| (sig.id.clone(), e))?;
        }
        Ok(set)
    }

    pub fn push(&mut self, id: &str, pattern: &str) -> Result<(), regex::Error> {
        self.signatures.push(Signature::new(id, pattern)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Id of the first signature matching any of `targets`.
    pub fn first_match<S: AsRef<str>>(&self, targets: &[S]) -> Option<&str> {
        self.signatures
            .iter()
            .find(|sig| targets.iter().any(|t| sig.is_match(t.as_ref())))
            .map(Signature::id)
    }
}

pub struct SignatureFilter {
    set: SignatureSet,
}

impl SignatureFilter {
    pub fn new(set: SignatureSet) -> Self {
        Self { set }
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.set
    }

    pub fn check(&self, request: &GuardRequest) -> Verdict {
        let targets = inspection_targets(request);
        match self.set.first_match(targets.as_slice()) {
            Some(id) => Denial::PayloadRejected {
                signature: id.to_string(),
            }
            .into(),
            None => Verdict::Admitted,
        }
    }
}

/// The raw URL and body plus their url-decoded forms, so percent-encoded
/// payloads are seen too.
fn inspection_targets(request: &GuardRequest) -> Vec<Cow<'_, str>> {
    let mut targets = vec![Cow::Borrowed(request.url.as_str())];
    if let Some(query) = request.query() {
        targets.push(Cow::Owned(decode_pairs(query.as_bytes())));
    }
    if !request.body.is_empty() {
        targets.push(request.body_text());
        if request.is_form() {
            targets.push(Cow::Owned(decode_pairs(&request.body)));
        }
    }
    targets
}

fn decode_pairs(input: &[u8]) -> String {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}
