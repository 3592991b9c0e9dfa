// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote instance directory: name -> (remote id, bound phone).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use zapflow_core::{InstanceApi, InstanceName, RemoteInstance, ResolvedInstance};

use crate::parse::is_placeholder_id;

/// Resolves instance names against the instance API, creating missing
/// instances on the way.
///
/// Every failure (transport, non-2xx, malformed body) collapses to `None`
/// and is logged; callers treat `None` as "not resolvable right now".
#[derive(Clone)]
pub struct InstanceDirectory {
    api: Arc<dyn InstanceApi>,
    settle_delay: Duration,
}

impl InstanceDirectory {
    /// `settle_delay` is how long the API needs between creating an instance
    /// and listing it with a real id.
    pub fn new(api: Arc<dyn InstanceApi>, settle_delay: Duration) -> Self {
        Self { api, settle_delay }
    }

    pub fn api(&self) -> &Arc<dyn InstanceApi> {
        &self.api
    }

    /// Looks the name up; creates the instance and looks again when absent.
    ///
    /// Idempotent: once the instance exists every call returns the same id.
    pub async fn resolve(&self, name: &InstanceName) -> Option<ResolvedInstance> {
        match self.lookup(name).await {
            Lookup::Found(resolved) => return Some(resolved),
            Lookup::Failed => return None,
            Lookup::Absent => {}
        }

        match self.api.create_instance(name).await {
            Ok(()) => {
                debug!(instance = %name, delay_ms = self.settle_delay.as_millis() as u64, "waiting for new instance to settle");
                tokio::time::sleep(self.settle_delay).await;
            }
            // A concurrent creator may have won; the second lookup decides.
            Err(e) => warn!(instance = %name, error = %e, "instance create failed"),
        }

        match self.lookup(name).await {
            Lookup::Found(resolved) => {
                info!(instance = %name, remote_id = %resolved.remote_id, "instance resolved after create");
                Some(resolved)
            }
            Lookup::Absent => {
                warn!(instance = %name, "instance still has no real id after create");
                None
            }
            Lookup::Failed => None,
        }
    }

    /// Looks the name up without ever creating it.
    pub async fn find(&self, name: &InstanceName) -> Option<ResolvedInstance> {
        match self.lookup(name).await {
            Lookup::Found(resolved) => Some(resolved),
            Lookup::Absent | Lookup::Failed => None,
        }
    }

    async fn lookup(&self, name: &InstanceName) -> Lookup {
        let instances = match self.api.fetch_instances(name).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(instance = %name, error = %e, "instance lookup failed");
                return Lookup::Failed;
            }
        };

        match select_instance(name, &instances) {
            Some(resolved) => Lookup::Found(resolved),
            None => Lookup::Absent,
        }
    }
}

enum Lookup {
    Found(ResolvedInstance),
    Absent,
    Failed,
}

/// Picks the entry for `name` from a listing and turns it into a resolution.
///
/// An entry matches when its name equals `name`. A nameless entry is accepted
/// only when it is the sole entry, since the listing was already filtered by
/// name. Placeholder ids never resolve.
pub fn select_instance(name: &InstanceName, instances: &[RemoteInstance]) -> Option<ResolvedInstance> {
    let entry = instances
        .iter()
        .find(|i| i.name.as_deref() == Some(name.as_str()))
        .or_else(|| match instances {
            [only] if only.name.is_none() => Some(only),
            _ => None,
        })?;

    let id = entry.id.as_deref()?;
    if is_placeholder_id(id) {
        debug!(instance = %name, id, "instance listed with placeholder id");
        return None;
    }

    Some(ResolvedInstance {
        remote_id: id.to_string(),
        phone: entry.phone.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: Option<&str>, name: Option<&str>, phone: Option<&str>) -> RemoteInstance {
        RemoteInstance {
            id: id.map(Into::into),
            name: name.map(Into::into),
            state: None,
            phone: phone.map(Into::into),
        }
    }

    fn nina() -> InstanceName {
        InstanceName::parse("nina-clinicasp").unwrap()
    }

    #[test]
    fn selects_by_exact_name() {
        let list = vec![
            remote(Some("other"), Some("nina-clinicasp-2"), None),
            remote(Some("right"), Some("nina-clinicasp"), Some("5511")),
        ];
        let resolved = select_instance(&nina(), &list).unwrap();
        assert_eq!(resolved.remote_id, "right");
        assert_eq!(resolved.phone.as_deref(), Some("5511"));
    }

    #[test]
    fn sole_nameless_entry_is_accepted() {
        let list = vec![remote(Some("only"), None, None)];
        assert_eq!(select_instance(&nina(), &list).unwrap().remote_id, "only");
    }

    #[test]
    fn nameless_entries_among_many_are_ignored() {
        let list = vec![remote(Some("a"), None, None), remote(Some("b"), None, None)];
        assert!(select_instance(&nina(), &list).is_none());
    }

    #[test]
    fn placeholder_or_missing_id_is_unresolved() {
        let list = vec![remote(
            Some("00000000-0000-0000-0000-000000000000"),
            Some("nina-clinicasp"),
            None,
        )];
        assert!(select_instance(&nina(), &list).is_none());

        let list = vec![remote(None, Some("nina-clinicasp"), None)];
        assert!(select_instance(&nina(), &list).is_none());
    }

    #[test]
    fn empty_listing_is_unresolved() {
        assert!(select_instance(&nina(), &[]).is_none());
    }
}
