//! Per-component outcome of a build ("partial apply" report).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::builder::stack::ComponentKind;
use crate::config::schema::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ComponentId {
    pub protocol: Protocol,
    pub kind: ComponentKind,
    pub name: String,
}

impl ComponentId {
    pub fn new(protocol: Protocol, kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            protocol,
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Enabled,
    Disabled,
}

/// A component is enabled unless at least one error was recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    #[serde(flatten)]
    pub id: ComponentId,
    pub status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    components: BTreeMap<ComponentId, Vec<String>>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the component was built; keeps earlier errors.
    pub fn enable(&mut self, id: ComponentId) {
        self.components.entry(id).or_default();
    }

    pub fn add_error(&mut self, id: ComponentId, error: impl Into<String>) {
        self.components.entry(id).or_default().push(error.into());
    }

    pub fn status(&self, protocol: Protocol, kind: ComponentKind, name: &str) -> Option<ComponentStatus> {
        let id = ComponentId::new(protocol, kind, name);
        self.components.get(&id).map(|errors| to_status(&id, errors))
    }

    pub fn is_enabled(&self, protocol: Protocol, kind: ComponentKind, name: &str) -> bool {
        self.status(protocol, kind, name)
            .is_some_and(|s| s.status == Status::Enabled)
    }

    pub fn entries(&self) -> Vec<ComponentStatus> {
        self.components
            .iter()
            .map(|(id, errors)| to_status(id, errors))
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.components.values().filter(|errors| !errors.is_empty()).count()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn to_status(id: &ComponentId, errors: &[String]) -> ComponentStatus {
    ComponentStatus {
        id: id.clone(),
        status: if errors.is_empty() {
            Status::Enabled
        } else {
            Status::Disabled
        },
        errors: errors.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_disable_components() {
        let mut report = BuildReport::new();
        report.enable(ComponentId::new(Protocol::Http, ComponentKind::Router, "ok"));
        report.add_error(
            ComponentId::new(Protocol::Http, ComponentKind::Router, "bad"),
            "service \"missing\" does not exist",
        );

        assert!(report.is_enabled(Protocol::Http, ComponentKind::Router, "ok"));
        assert!(!report.is_enabled(Protocol::Http, ComponentKind::Router, "bad"));
        assert!(report.status(Protocol::Tcp, ComponentKind::Router, "ok").is_none());
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn serializes_flat_entries() {
        let mut report = BuildReport::new();
        report.add_error(ComponentId::new(Protocol::Tcp, ComponentKind::Service, "db"), "boom");

        let json = serde_json::to_value(report.entries()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "protocol": "tcp",
                "kind": "service",
                "name": "db",
                "status": "disabled",
                "errors": ["boom"]
            }])
        );
    }
}
