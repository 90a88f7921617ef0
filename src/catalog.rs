//! Static catalog of cacheable operations
//!
//! Every operation the dashboard can cache is declared here together with the
//! back-end service it belongs to and, when it can be fetched without caller
//! input, the query document used to refresh it. Service groups bundle
//! operations for bulk refresh/clear and define the universe shown in status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote back-end an operation is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Accounts, organizations and identity
    Core,
    /// Invoices and plan usage
    Billing,
    /// Health, metrics and audit trail
    Telemetry,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Core, Service::Billing, Service::Telemetry];

    /// Key segment used in storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Core => "core",
            Service::Billing => "billing",
            Service::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit of cacheable work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub service: Service,
    /// Parameterless query used for proactive refresh, if any
    pub document: Option<&'static str>,
}

/// Ops-facing bundle of operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroup {
    pub name: &'static str,
    pub display_name: &'static str,
    pub operations: Vec<&'static str>,
}

/// Operations and groups known to the cache manager
#[derive(Debug, Clone)]
pub struct Catalog {
    operations: Vec<OperationSpec>,
    groups: Vec<ServiceGroup>,
}

impl Catalog {
    pub fn new(operations: Vec<OperationSpec>, groups: Vec<ServiceGroup>) -> Self {
        Self { operations, groups }
    }

    /// The admin dashboard's operations and groups
    pub fn admin_dashboard() -> Self {
        Self::new(ADMIN_OPERATIONS.to_vec(), admin_groups())
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn group(&self, name: &str) -> Option<&ServiceGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn groups(&self) -> &[ServiceGroup] {
        &self.groups
    }

    /// Every operation named by any group, first occurrence wins
    pub fn grouped_operations(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for group in &self.groups {
            for name in &group.operations {
                if !names.contains(name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

static ADMIN_OPERATIONS: [OperationSpec; 11] = [
    OperationSpec {
        name: "getCurrentUser",
        service: Service::Core,
        document: Some("query getCurrentUser { getCurrentUser { id email role } }"),
    },
    OperationSpec {
        name: "listUsers",
        service: Service::Core,
        document: Some("query listUsers { listUsers { id email role lastSeenAt } }"),
    },
    OperationSpec {
        name: "getUserStats",
        service: Service::Core,
        document: Some("query getUserStats { getUserStats { total active invited } }"),
    },
    OperationSpec {
        name: "listOrganizations",
        service: Service::Core,
        document: Some("query listOrganizations { listOrganizations { id name plan } }"),
    },
    OperationSpec {
        name: "getOrganizationDetails",
        service: Service::Core,
        document: None,
    },
    OperationSpec {
        name: "getBillingSummary",
        service: Service::Billing,
        document: Some("query getBillingSummary { getBillingSummary { mrr outstanding currency } }"),
    },
    OperationSpec {
        name: "listInvoices",
        service: Service::Billing,
        document: Some("query listInvoices { listInvoices { id amount status issuedAt } }"),
    },
    OperationSpec {
        name: "getSystemHealth",
        service: Service::Telemetry,
        document: Some("query getSystemHealth { getSystemHealth { status checks { name ok } } }"),
    },
    OperationSpec {
        name: "getUsageMetrics",
        service: Service::Telemetry,
        document: Some("query getUsageMetrics { getUsageMetrics { requests errors p95 } }"),
    },
    OperationSpec {
        name: "listAuditLogs",
        service: Service::Telemetry,
        document: None,
    },
    OperationSpec {
        name: "searchAuditEvents",
        service: Service::Telemetry,
        document: None,
    },
];

fn admin_groups() -> Vec<ServiceGroup> {
    vec![
        ServiceGroup {
            name: "users",
            display_name: "Users & Accounts",
            operations: vec!["getCurrentUser", "listUsers", "getUserStats"],
        },
        ServiceGroup {
            name: "organizations",
            display_name: "Organizations",
            operations: vec!["listOrganizations", "getOrganizationDetails"],
        },
        ServiceGroup {
            name: "billing",
            display_name: "Billing",
            operations: vec!["getBillingSummary", "listInvoices"],
        },
        ServiceGroup {
            name: "monitoring",
            display_name: "Monitoring & Audit",
            operations: vec![
                "getSystemHealth",
                "getUsageMetrics",
                "listAuditLogs",
                "searchAuditEvents",
            ],
        },
    ]
}
