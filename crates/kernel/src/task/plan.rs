//! Install/upgrade plans and the dependency resolver that builds them.
//!
//! [`PlanBuilder::resolve`] walks a plugin's declared dependencies depth
//! first: the plugin itself, then its package requirements, then every
//! plugin dependency that is missing or too old. Operations are keyed by
//! [`DependencyTarget`]; the first operation recorded for a target wins.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::executor::normalize_package_name;
use crate::plugin::{
    Catalog, DependencyChecker, DependencyError, DependencyOperation, DependencyTarget,
    PluginError, parse_requirement,
};

/// What an operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Upgrade,
}

impl OperationKind {
    /// Kind for a dependency remediation; `None` for [`DependencyOperation::Ignore`].
    pub fn from_dependency(operation: DependencyOperation) -> Option<Self> {
        match operation {
            DependencyOperation::Install => Some(Self::Install),
            DependencyOperation::Upgrade => Some(Self::Upgrade),
            DependencyOperation::Ignore => None,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
        }
    }

    /// Progressive form used in progress lines.
    pub fn progressive(&self) -> &'static str {
        match self {
            Self::Install => "Installing",
            Self::Upgrade => "Upgrading",
        }
    }
}

/// One concrete action on a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub target: DependencyTarget,
    pub kind: OperationKind,
}

impl Operation {
    pub fn plugin(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            target: DependencyTarget::Plugin(id.into()),
            kind,
        }
    }

    pub fn package(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            target: DependencyTarget::Package(name.into()),
            kind,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.verb(), self.target)
    }
}

/// Ordered, deduplicated operations plus the request they came from.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<Operation>,
    seen: HashSet<DependencyTarget>,
    requested: Vec<String>,
}

impl Plan {
    /// Append `operation` unless its target already has one.
    /// Returns whether it was added.
    pub fn push(&mut self, operation: Operation) -> bool {
        if !self.seen.insert(operation.target.clone()) {
            debug!(dependency = %operation.target, "operation already planned, dropping duplicate");
            return false;
        }
        self.operations.push(operation);
        true
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Ids of the plugins the request asked for.
    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn plugin_operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| op.target.is_plugin())
    }

    pub fn package_operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| !op.target.is_plugin())
    }
}

/// Resolves requested plugins into a [`Plan`].
///
/// Every plugin id is expanded at most once, so dependency cycles and
/// diamonds terminate and produce a single operation per target.
pub struct PlanBuilder<'a> {
    catalog: &'a dyn Catalog,
    checker: DependencyChecker<'a>,
    plan: Plan,
    visited: HashSet<String>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(catalog: &'a dyn Catalog, checker: DependencyChecker<'a>) -> Self {
        Self {
            catalog,
            checker,
            plan: Plan::default(),
            visited: HashSet::new(),
        }
    }

    /// Resolve a requested plugin id.
    pub fn request(&mut self, id: &str, kind: OperationKind) -> Result<(), PluginError> {
        self.plan.requested.push(id.to_string());
        self.resolve(id, kind)
    }

    /// Plan `kind` for plugin `id` and everything it needs.
    ///
    /// Fails with [`PluginError::UnknownPlugin`] when `id`, or any plugin it
    /// transitively needs, is missing from the catalog.
    pub fn resolve(&mut self, id: &str, kind: OperationKind) -> Result<(), PluginError> {
        if !self.visited.insert(id.to_string()) {
            debug!(plugin = %id, "plugin already resolved");
            return Ok(());
        }

        self.plan.push(Operation::plugin(id, kind));
        let record = self
            .catalog
            .get(id)
            .ok_or_else(|| PluginError::unknown_plugin(id))?;

        self.operate_packages(id, &record.meta.requirements);

        for (dep_id, requirement) in &record.meta.dependencies {
            if dep_id == self.checker.host_id() {
                continue;
            }

            let target = DependencyTarget::Plugin(dep_id.clone());
            let Err(err) = self.checker.check(&target, requirement) else {
                continue;
            };

            match OperationKind::from_dependency(err.operation()) {
                Some(dep_kind) => {
                    debug!(
                        plugin = %id,
                        dependency = %dep_id,
                        reason = %err,
                        "dependency needs {}",
                        dep_kind.verb()
                    );
                    self.resolve(dep_id, dep_kind)?;
                }
                None => warn_invalid(id, &err),
            }
        }

        Ok(())
    }

    fn operate_packages(&mut self, id: &str, requirements: &[String]) {
        let host_package = normalize_package_name(self.checker.host_id());

        for raw in requirements {
            let requirement = match parse_requirement(raw) {
                Ok(requirement) => requirement,
                Err(e) => {
                    warn!(plugin = %id, error = %e, "skipping package requirement");
                    continue;
                }
            };
            let name = normalize_package_name(&requirement.name);
            if name == host_package {
                debug!(plugin = %id, "skipping host package requirement");
                continue;
            }

            // Keyed on the normalized name so `Requests` and `requests` merge.
            let target = DependencyTarget::Package(name);
            if let Err(err) = self.checker.check(&target, &requirement.requirement) {
                match OperationKind::from_dependency(err.operation()) {
                    Some(kind) => {
                        self.plan.push(Operation { target, kind });
                    }
                    None => warn_invalid(id, &err),
                }
            }
        }
    }

    pub fn finish(self) -> Plan {
        self.plan
    }
}

fn warn_invalid(id: &str, err: &DependencyError) {
    warn!(plugin = %id, error = %err, "ignoring dependency with invalid requirement");
}
