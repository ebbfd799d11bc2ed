use invoicekit_core::TenantId;

/// Tenant context for a request.
///
/// Set by the tenant middleware from the `X-Tenant-Id` header and immutable
/// afterwards; every domain route reads it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
