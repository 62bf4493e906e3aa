use std::fmt::Write;

use sha1::{Digest, Sha1};

use entitlements_core::OrganizationId;
use entitlements_domain::{RoleId, UserId};

/// Builds the namespaced snapshot key over user, organization and sorted role ids.
pub(super) fn snapshot_cache_key<'a>(
    namespace: &str,
    user_id: &UserId,
    organization_id: &OrganizationId,
    role_ids: impl IntoIterator<Item = &'a RoleId>,
) -> String {
    let mut role_ids = role_ids
        .into_iter()
        .map(RoleId::as_str)
        .collect::<Vec<_>>();
    role_ids.sort_unstable();
    role_ids.dedup();

    let mut hasher = Sha1::new();
    hasher.update(format!("{user_id}:{organization_id}:{}", role_ids.join(",")).as_bytes());
    let digest = hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(40), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        });

    let namespace = namespace.trim();
    if namespace.is_empty() {
        digest
    } else {
        format!("{namespace}:{digest}")
    }
}

#[cfg(test)]
mod tests {
    use entitlements_core::OrganizationId;
    use entitlements_domain::{RoleId, UserId};

    use super::snapshot_cache_key;

    fn role(value: &str) -> RoleId {
        RoleId::new(value).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn key_ignores_role_order() {
        let user_id = UserId::new("alice").unwrap_or_else(|_| unreachable!());
        let organization_id = OrganizationId::new("org-1").unwrap_or_else(|_| unreachable!());
        let editor = role("editor");
        let viewer = role("viewer");

        let forward = snapshot_cache_key("ns", &user_id, &organization_id, [&editor, &viewer]);
        let backward = snapshot_cache_key("ns", &user_id, &organization_id, [&viewer, &editor]);

        assert_eq!(forward, backward);
        assert!(forward.starts_with("ns:"));
        assert_eq!(forward.len(), "ns:".len() + 40);
    }

    #[test]
    fn key_is_sha1_of_user_organization_and_roles() {
        let user_id = UserId::new("alice").unwrap_or_else(|_| unreachable!());
        let organization_id = OrganizationId::new("org-1").unwrap_or_else(|_| unreachable!());
        let viewer = role("viewer");
        let editor = role("editor");

        let key = snapshot_cache_key("", &user_id, &organization_id, [&viewer, &editor]);
        assert_eq!(key, "e9ef08ef4fbaeede5f738537723ff0d32aada47d");

        let no_roles: [&RoleId; 0] = [];
        let empty = snapshot_cache_key("", &user_id, &organization_id, no_roles);
        assert_eq!(empty.len(), 40);
        assert_ne!(empty, key);
    }
}
