//! Callback Types
//!
//! Raw and normalized shapes for authorization redirect results. The query
//! and fragment channels are parsed separately; which channel is trusted is
//! a per-flow decision made by the extractor, not here.

/// Parameters carried on the query channel of a redirect.
#[derive(Clone, Debug, Default)]
pub struct QueryCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl QueryCallback {
    /// Parse a raw query string (with or without a leading `?`).
    pub fn parse(raw_query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_pairs(raw_query.trim_start_matches('?')) {
            match key.as_str() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Parameters carried on the fragment channel of a redirect.
#[derive(Clone, Debug, Default)]
pub struct FragmentCallback {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    /// Hybrid responses put the authorization code on the fragment too.
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl FragmentCallback {
    /// Parse a raw fragment string (with or without a leading `#`).
    pub fn parse(raw_fragment: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_pairs(raw_fragment.trim_start_matches('#')) {
            match key.as_str() {
                "access_token" => params.access_token = Some(value),
                "id_token" => params.id_token = Some(value),
                "token_type" => params.token_type = Some(value),
                "expires_in" => params.expires_in = value.parse().ok(),
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.id_token.is_none()
            && self.code.is_none()
            && self.state.is_none()
            && self.error.is_none()
    }
}

fn form_pairs(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Normalized redirect result after channel-authority and correlation checks.
#[derive(Clone, Debug, Default)]
pub struct CallbackData {
    pub authorization_code: Option<String>,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

impl CallbackData {
    pub fn merge(mut self, other: CallbackData) -> Self {
        self.authorization_code = self.authorization_code.or(other.authorization_code);
        self.access_token = self.access_token.or(other.access_token);
        self.id_token = self.id_token.or(other.id_token);
        self.token_type = self.token_type.or(other.token_type);
        self.expires_in = self.expires_in.or(other.expires_in);
        self
    }
}
