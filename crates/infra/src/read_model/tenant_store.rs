use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::RwLock;

use acopio_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Every access is scoped by `TenantId`; a key never resolves across
/// tenants. Services hold these behind `Arc<dyn TenantStore<K, V>>` so the
/// query side can answer lookups (available stock, duplicate invoices,
/// pending quarantine) without touching the event store.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop all records for a tenant (rebuild support).
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

/// In-memory tenant-isolated store.
///
/// Single-process deployments and tests run entirely on this; a poisoned
/// lock degrades to "no data" rather than panicking, which is acceptable
/// for rebuildable views.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
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
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use acopio_core::AggregateId;
    use acopio_materials::MaterialId;

    fn material_id() -> MaterialId {
        MaterialId::new(AggregateId::new())
    }

    #[test]
    fn get_is_scoped_per_tenant() {
        let store: InMemoryTenantStore<MaterialId, i64> = InMemoryTenantStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let material = material_id();

        store.upsert(tenant_a, material, 150);

        assert_eq!(store.get(tenant_a, &material), Some(150));
        assert_eq!(store.get(tenant_b, &material), None);
    }

    #[test]
    fn upsert_replaces_existing_value() {
        let store: InMemoryTenantStore<MaterialId, i64> = InMemoryTenantStore::new();
        let tenant = TenantId::new();
        let material = material_id();

        store.upsert(tenant, material, 10);
        store.upsert(tenant, material, 25);

        assert_eq!(store.get(tenant, &material), Some(25));
        assert_eq!(store.list(tenant).len(), 1);
    }

    #[test]
    fn clear_tenant_leaves_other_tenants_intact() {
        let store: InMemoryTenantStore<MaterialId, i64> = InMemoryTenantStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        store.upsert(tenant_a, material_id(), 1);
        store.upsert(tenant_a, material_id(), 2);
        store.upsert(tenant_b, material_id(), 3);

        store.clear_tenant(tenant_a);

        assert!(store.list(tenant_a).is_empty());
        assert_eq!(store.list(tenant_b).len(), 1);
    }
}
