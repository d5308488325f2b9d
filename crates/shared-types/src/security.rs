//! # Security Principal
//!
//! The authenticated caller attached to API requests by the security layer.
//! Only what the rate limiter and API handlers read is modelled here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    /// Platform operator. Not bound to a tenant.
    SysAdmin,
    /// Administrator of one tenant.
    TenantAdmin,
    /// User belonging to a customer of a tenant.
    CustomerUser,
}

/// The principal behind an API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityUser {
    /// User id.
    pub user_id: Uuid,
    /// Tenant the user belongs to. Nil for system administrators.
    pub tenant_id: Uuid,
    /// Customer the user belongs to, for customer users.
    pub customer_id: Option<Uuid>,
    /// Role.
    pub authority: Authority,
}

impl SecurityUser {
    /// True for platform operators.
    pub fn is_system_admin(&self) -> bool {
        self.authority == Authority::SysAdmin
    }

    /// True for customer users with a customer assigned.
    pub fn is_customer_user(&self) -> bool {
        self.authority == Authority::CustomerUser && self.customer_id.is_some()
    }
}
