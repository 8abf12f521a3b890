//! Permitted groups and lazily built per-group backend state.

use crate::{
    config::SpakeConfig,
    group::{self, GroupBackend, GroupDef, KeyPair, Role},
    Error, Result,
};
use rand_core::CryptoRngCore;
use std::{collections::HashMap, fmt, sync::OnceLock};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

/// Group used by clients when no list is configured.
const DEFAULT_CLIENT_GROUP: &str = "edwards25519";

/// Group policy and backend state for one side of the exchange.
///
/// Backend state for a group is built the first time the group is used and
/// is read-only afterwards, so one registry can serve concurrent exchanges.
pub struct GroupRegistry {
    role: Role,
    permitted: Vec<i32>,
    challenge_group: Option<i32>,
    states: HashMap<i32, OnceLock<Box<dyn GroupBackend>>>,
}

impl GroupRegistry {
    /// Resolve `config` for `role`.
    ///
    /// Unknown group names are skipped. Fails if no permitted group remains,
    /// or if a KDC's challenge group is not itself permitted.
    pub fn new(role: Role, config: &SpakeConfig) -> Result<Self> {
        let names: Vec<&str> = match (&config.groups, role) {
            (Some(groups), _) => groups.iter().map(String::as_str).collect(),
            (None, Role::Client) => vec![DEFAULT_CLIENT_GROUP],
            (None, Role::Kdc) => Vec::new(),
        };

        let mut permitted = Vec::new();
        for name in names {
            match group::find_by_name(name) {
                Some(def) if !permitted.contains(&def.id) => permitted.push(def.id),
                Some(_) => {}
                None => warn!(name, "skipping unknown SPAKE group"),
            }
        }
        if permitted.is_empty() {
            return Err(Error::NoPermittedGroups);
        }

        let challenge_group = match (role, config.challenge_group.as_deref()) {
            (Role::Kdc, Some(name)) => {
                let id = group::find_by_name(name)
                    .map(|def| def.id)
                    .filter(|id| permitted.contains(id))
                    .ok_or(Error::ChallengeGroupNotPermitted)?;
                Some(id)
            }
            _ => None,
        };

        let states = group::all_groups()
            .iter()
            .map(|def| (def.id, OnceLock::new()))
            .collect();

        debug!(?role, ?permitted, ?challenge_group, "initialized SPAKE groups");
        Ok(GroupRegistry {
            role,
            permitted,
            challenge_group,
            states,
        })
    }

    /// Role this registry was configured for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Permitted group numbers in preference order.
    pub fn permitted(&self) -> &[i32] {
        &self.permitted
    }

    /// Whether `group` is permitted.
    pub fn is_permitted(&self, group: i32) -> bool {
        self.permitted.contains(&group)
    }

    /// Optimistic challenge group (KDC only).
    pub fn challenge_group(&self) -> Option<i32> {
        self.challenge_group
    }

    /// First group in `offered` that is also permitted here.
    pub fn select(&self, offered: &[i32]) -> Option<i32> {
        offered.iter().copied().find(|id| self.is_permitted(*id))
    }

    /// Registration for `group`.
    pub fn def(&self, group: i32) -> Result<&'static GroupDef> {
        group::find_by_id(group).ok_or(Error::InvalidArgument)
    }

    fn backend(&self, def: &GroupDef) -> Result<&dyn GroupBackend> {
        let cell = self.states.get(&def.id).ok_or(Error::InvalidArgument)?;
        if let Some(backend) = cell.get() {
            return Ok(backend.as_ref());
        }

        trace!(group = def.name, "building group state");
        let backend = (def.init)(def)?;
        // Another thread may have won the race; its state is equivalent.
        let _ = cell.set(backend);
        cell.get()
            .map(|backend| backend.as_ref())
            .ok_or(Error::InvalidArgument)
    }

    /// Generate a private scalar and a public element masked with the
    /// constant belonging to `role`.
    pub fn keygen(
        &self,
        rng: &mut dyn CryptoRngCore,
        role: Role,
        group: i32,
        wbytes: &[u8],
    ) -> Result<KeyPair> {
        let def = self.def(group)?;
        if wbytes.len() != def.scalar_len {
            return Err(Error::InvalidArgument);
        }
        self.backend(def)?.keygen(rng, wbytes, role.own_constant())
    }

    /// Compute the shared element from our private scalar and the peer's
    /// public element, unmasking with the constant of the peer's role.
    pub fn result(
        &self,
        role: Role,
        group: i32,
        wbytes: &[u8],
        ours: &[u8],
        theirs: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let def = self.def(group)?;
        if wbytes.len() != def.scalar_len
            || ours.len() != def.scalar_len
            || theirs.len() != def.element_len
        {
            return Err(Error::InvalidArgument);
        }
        self.backend(def)?.result(wbytes, ours, theirs, role.peer_constant())
    }

    /// Hash the concatenation of `parts` with the group's hash function.
    pub fn hash(&self, group: i32, parts: &[&[u8]]) -> Result<Vec<u8>> {
        Ok(self.def(group)?.hash.digest(parts))
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("role", &self.role)
            .field("permitted", &self.permitted)
            .field("challenge_group", &self.challenge_group)
            .finish_non_exhaustive()
    }
}
