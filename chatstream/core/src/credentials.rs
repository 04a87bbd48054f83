//! Credential Resolution
//!
//! Derives the authentication context for one request from persisted state:
//! the bearer token, a fresh correlation id, and the tenant to act on when the
//! user switched away from their own tenant.

use std::fmt;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::StreamError;
use crate::state::StateProvider;

/// Length of generated request correlation ids
pub const REQUEST_ID_LEN: usize = 12;

/// Per-request correlation id sent as `X-Request-ID`
///
/// Uniqueness is best-effort; a collision only costs traceability.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REQUEST_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authentication context for one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    /// Bearer token
    pub bearer_token: String,
    /// Fresh correlation id
    pub request_id: RequestId,
    /// Tenant to act on, only when it differs from the caller's default tenant
    pub tenant_override: Option<String>,
}

/// Resolves [`AuthContext`]s from a [`StateProvider`]
#[derive(Clone)]
pub struct CredentialResolver {
    state: Arc<dyn StateProvider>,
}

impl CredentialResolver {
    /// Create a resolver over the given state
    pub fn new(state: Arc<dyn StateProvider>) -> Self {
        Self { state }
    }

    /// Resolve credentials for a new request
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MissingCredential`] when no bearer token is
    /// persisted. Malformed tenant state is logged and ignored.
    pub fn resolve(&self) -> Result<AuthContext, StreamError> {
        let bearer_token = self
            .state
            .bearer_token()
            .filter(|t| !t.is_empty())
            .ok_or(StreamError::MissingCredential)?;

        let tenant_override = match self.tenant_override() {
            Ok(tenant) => tenant,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring tenant selection, using default tenant");
                None
            }
        };

        Ok(AuthContext {
            bearer_token,
            request_id: RequestId::new(),
            tenant_override,
        })
    }

    fn tenant_override(&self) -> Result<Option<String>, StreamError> {
        let Some(selected) = self.state.selected_tenant_id().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let default_id = match self.state.default_tenant() {
            Some(blob) => default_tenant_id(&blob)?,
            None => None,
        };

        if default_id.as_deref() == Some(selected.as_str()) {
            Ok(None)
        } else {
            Ok(Some(selected))
        }
    }
}

/// Extract the `id` of a persisted default tenant
///
/// A missing, null, zero, or empty id counts as "no default tenant".
fn default_tenant_id(blob: &str) -> Result<Option<String>, StreamError> {
    let value: serde_json::Value =
        serde_json::from_str(blob).map_err(|e| StreamError::MalformedTenantState(e.to_string()))?;

    let id = match value.get("id") {
        Some(serde_json::Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                (i != 0).then(|| i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().filter(|f| *f != 0.0).map(|f| f.to_string())
            }
        }
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        MemoryStateStore, DEFAULT_TENANT_KEY, SELECTED_TENANT_KEY, TOKEN_KEY,
    };

    fn resolver(store: MemoryStateStore) -> CredentialResolver {
        CredentialResolver::new(Arc::new(store))
    }

    #[test]
    fn test_missing_token_fails() {
        let result = resolver(MemoryStateStore::new()).resolve();
        assert_eq!(result, Err(StreamError::MissingCredential));

        let result = resolver(MemoryStateStore::new().with(TOKEN_KEY, "")).resolve();
        assert_eq!(result, Err(StreamError::MissingCredential));
    }

    #[test]
    fn test_selected_tenant_differs_from_default() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(DEFAULT_TENANT_KEY, r#"{"id":5}"#)
            .with(SELECTED_TENANT_KEY, "7");

        let auth = resolver(store).resolve().unwrap();
        assert_eq!(auth.bearer_token, "tok1");
        assert_eq!(auth.tenant_override.as_deref(), Some("7"));
    }

    #[test]
    fn test_selected_tenant_equals_default() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(DEFAULT_TENANT_KEY, r#"{"id":5,"name":"acme"}"#)
            .with(SELECTED_TENANT_KEY, "5");

        let auth = resolver(store).resolve().unwrap();
        assert!(auth.tenant_override.is_none());
    }

    #[test]
    fn test_string_default_id_compares_equal() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(DEFAULT_TENANT_KEY, r#"{"id":"5"}"#)
            .with(SELECTED_TENANT_KEY, "5");

        assert!(resolver(store).resolve().unwrap().tenant_override.is_none());
    }

    #[test]
    fn test_no_default_tenant_means_override() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(SELECTED_TENANT_KEY, "9");

        let auth = resolver(store).resolve().unwrap();
        assert_eq!(auth.tenant_override.as_deref(), Some("9"));
    }

    #[test]
    fn test_malformed_default_tenant_is_ignored() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(DEFAULT_TENANT_KEY, "{not json")
            .with(SELECTED_TENANT_KEY, "7");

        let auth = resolver(store).resolve().unwrap();
        assert!(auth.tenant_override.is_none());
    }

    #[test]
    fn test_no_selection_no_override() {
        let store = MemoryStateStore::new()
            .with(TOKEN_KEY, "tok1")
            .with(DEFAULT_TENANT_KEY, r#"{"id":5}"#);

        assert!(resolver(store).resolve().unwrap().tenant_override.is_none());
    }

    #[test]
    fn test_default_tenant_id_zero_is_absent() {
        assert_eq!(default_tenant_id(r#"{"id":0}"#).unwrap(), None);
        assert_eq!(default_tenant_id(r#"{"id":""}"#).unwrap(), None);
        assert_eq!(default_tenant_id("null").unwrap(), None);
        assert_eq!(default_tenant_id(r#"{"id":42}"#).unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let store = MemoryStateStore::new().with(TOKEN_KEY, "tok1");
        let resolver = resolver(store);

        let a = resolver.resolve().unwrap().request_id;
        let b = resolver.resolve().unwrap().request_id;
        assert_eq!(a.as_str().len(), REQUEST_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
