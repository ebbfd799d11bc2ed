use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use invoicekit_core::TenantId;

/// Tenant-isolated key/value store for read models.
///
/// Every call names the tenant; there is no way to list or fetch across tenants.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop every record of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant store, partitioned per tenant.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    partitions: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let partitions = self.partitions.read().ok()?;
        partitions.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut partitions) = self.partitions.write() {
            partitions.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(partitions) = self.partitions.read() else {
            return vec![];
        };

        partitions
            .get(&tenant_id)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut partitions) = self.partitions.write() {
            partitions.remove(&tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_never_see_each_other() {
        let store = InMemoryTenantStore::<u32, &'static str>::new();
        let a = TenantId::new();
        let b = TenantId::new();

        store.upsert(a, 1, "a-one");
        store.upsert(b, 1, "b-one");

        assert_eq!(store.get(a, &1), Some("a-one"));
        assert_eq!(store.get(b, &1), Some("b-one"));
        assert_eq!(store.list(a), vec!["a-one"]);
    }

    #[test]
    fn clear_only_touches_one_tenant() {
        let store = InMemoryTenantStore::<u32, u32>::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store.upsert(a, 1, 10);
        store.upsert(b, 1, 20);

        store.clear_tenant(a);

        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some(20));
    }
}
