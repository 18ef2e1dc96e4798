//! Request context and role capabilities.
//!
//! Every gated operation names itself with an [`Operation`] and asks the caller's
//! [`RequestContext`] whether its role allows it. The role-to-operation map lives
//! in one place, [`Role::permits`].

use crate::{
    entities::Role,
    errors::{Error, Result},
};

/// Operations that require a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read any client record
    ReadClients,
    /// Create, update or delete clients
    ManageClients,
    /// Read every client's debts
    ReadAllDebts,
    /// Read the debts of the client linked to the login
    ReadOwnDebts,
    /// Create, update or delete debts
    ManageDebts,
    /// Read payments
    ReadPayments,
    /// Record, apply, update or delete payments
    ManagePayments,
    /// Read user accounts
    ReadUsers,
    /// Create, update or delete user accounts
    ManageUsers,
    /// Read the audit trail
    ReadAudit,
    /// Trigger the monthly debt generator
    RunMonthlyBilling,
    /// Dashboard totals
    ViewDashboard,
}

impl Operation {
    const fn describe(self) -> &'static str {
        match self {
            Self::ReadClients => "read clients",
            Self::ManageClients => "manage clients",
            Self::ReadAllDebts => "read all debts",
            Self::ReadOwnDebts => "read own debts",
            Self::ManageDebts => "manage debts",
            Self::ReadPayments => "read payments",
            Self::ManagePayments => "manage payments",
            Self::ReadUsers => "read users",
            Self::ManageUsers => "manage users",
            Self::ReadAudit => "read the audit log",
            Self::RunMonthlyBilling => "run monthly billing",
            Self::ViewDashboard => "view the dashboard",
        }
    }
}

impl Role {
    /// The capability map.
    #[must_use]
    pub const fn permits(self, operation: Operation) -> bool {
        match self {
            Self::Admin => true,
            Self::Editor => !matches!(operation, Operation::ReadAudit),
            Self::Viewer | Self::Client => {
                matches!(operation, Operation::ReadOwnDebts)
            }
        }
    }
}

/// The authenticated principal an operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Logged-in user, `None` for system jobs
    pub user_id: Option<i64>,
    /// Role of the principal
    pub role: Role,
    /// Client record linked to the login (own-debt reads)
    pub client_id: Option<i64>,
    /// Address the request came from, copied into audit records
    pub source_address: Option<String>,
}

impl RequestContext {
    /// Context for an authenticated user.
    #[must_use]
    pub const fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role,
            client_id: None,
            source_address: None,
        }
    }

    /// Administrator context with no user, used by scheduled jobs.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            user_id: None,
            role: Role::Admin,
            client_id: None,
            source_address: None,
        }
    }

    /// Links the context to a client record.
    #[must_use]
    pub fn with_client(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Attaches the request's source address.
    #[must_use]
    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    /// Fails with [`Error::PermissionDenied`] unless the role allows `operation`.
    pub fn require(&self, operation: Operation) -> Result<()> {
        if self.role.permits(operation) {
            Ok(())
        } else {
            Err(self.denied(operation))
        }
    }

    /// Allows reading `client_id`'s debts: staff with read-all, or the client's own login.
    pub fn require_client_scope(&self, client_id: i64) -> Result<()> {
        if self.role.permits(Operation::ReadAllDebts) {
            return Ok(());
        }
        if self.role.permits(Operation::ReadOwnDebts) && self.client_id == Some(client_id) {
            return Ok(());
        }
        Err(self.denied(Operation::ReadAllDebts))
    }

    fn denied(&self, operation: Operation) -> Error {
        tracing::warn!(
            user_id = ?self.user_id,
            role = %self.role,
            "Denied: {}",
            operation.describe()
        );
        Error::PermissionDenied {
            role: self.role.to_string(),
            operation: operation.describe().to_string(),
        }
    }
}
