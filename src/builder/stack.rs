//! Cycle detection for nested component construction.

use std::fmt;

use serde::Serialize;

use crate::builder::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Router,
    Middleware,
    Service,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Router => write!(f, "router"),
            ComponentKind::Middleware => write!(f, "middleware"),
            ComponentKind::Service => write!(f, "service"),
        }
    }
}

/// `kind:name`, the unit tracked on the stack.
pub fn token(kind: ComponentKind, name: &str) -> String {
    format!("{kind}:{name}")
}

/// Components under construction on the current call path, outermost first.
///
/// Each nested construction receives its own extended copy, so sibling branches
/// never see each other's tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiationStack {
    tokens: Vec<String>,
}

impl InstantiationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stack for constructing `kind:name` below this one.
    ///
    /// Fails with `RecursionDetected` if the token is already in progress; the
    /// error path lists the whole chain including the repeated token.
    pub fn push(&self, kind: ComponentKind, name: &str) -> Result<Self, BuildError> {
        let token = token(kind, name);
        let mut tokens = self.tokens.clone();
        let seen = tokens.contains(&token);
        tokens.push(token);

        if seen {
            return Err(BuildError::RecursionDetected {
                path: tokens.join("->"),
            });
        }
        Ok(Self { tokens })
    }

    pub fn contains(&self, kind: ComponentKind, name: &str) -> bool {
        let token = token(kind, name);
        self.tokens.iter().any(|t| *t == token)
    }

    pub fn path(&self) -> String {
        self.tokens.join("->")
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_extends_a_copy() {
        let root = InstantiationStack::new();
        let router = root.push(ComponentKind::Router, "edge").unwrap();
        let left = router.push(ComponentKind::Middleware, "auth").unwrap();
        let right = router.push(ComponentKind::Service, "app").unwrap();

        assert!(root.is_empty());
        assert_eq!(left.path(), "router:edge->middleware:auth");
        assert_eq!(right.path(), "router:edge->service:app");
        assert!(!right.contains(ComponentKind::Middleware, "auth"));
    }

    #[test]
    fn repeated_token_reports_full_path() {
        let stack = InstantiationStack::new()
            .push(ComponentKind::Router, "edge")
            .unwrap()
            .push(ComponentKind::Middleware, "auth")
            .unwrap()
            .push(ComponentKind::Middleware, "edge")
            .unwrap();

        let err = stack.push(ComponentKind::Middleware, "auth").unwrap_err();
        assert_eq!(
            err,
            BuildError::RecursionDetected {
                path: "router:edge->middleware:auth->middleware:edge->middleware:auth".into()
            }
        );
    }

    #[test]
    fn same_name_different_kind_is_not_a_cycle() {
        let stack = InstantiationStack::new().push(ComponentKind::Router, "edge").unwrap();
        assert!(stack.push(ComponentKind::Middleware, "edge").is_ok());
    }
}
