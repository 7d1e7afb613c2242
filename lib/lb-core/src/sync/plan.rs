//! Diff of desired objects against the realized-state cache

use crate::cache::CacheEntry;
use crate::client::{LbObject, ObjectRef, ObjectType};
use std::collections::HashMap;

/// One REST call the sync engine has to make
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Create(LbObject),
    Update { uuid: String, object: LbObject },
    Delete(CacheEntry),
}

impl Operation {
    pub fn object_ref(&self) -> ObjectRef {
        match self {
            Operation::Create(object) | Operation::Update { object, .. } => object.object_ref(),
            Operation::Delete(entry) => entry.object_ref(),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Operation::Create(_) => "create",
            Operation::Update { .. } => "update",
            Operation::Delete(_) => "delete",
        }
    }

    /// Apply stage: referenced objects exist before anything points at
    /// them, and nothing is deleted while still referenced
    fn stage(&self) -> u8 {
        match self {
            Operation::Create(object) | Operation::Update { object, .. } => match object.object_type {
                ObjectType::SslKeyAndCertificate | ObjectType::Pool => 0,
                ObjectType::PoolGroup | ObjectType::HttpPolicySet => 1,
                ObjectType::VirtualService if object.is_child_vs() => 3,
                // A new parent must exist before its children; an updated one
                // may drop references only after the children moved off them.
                ObjectType::VirtualService if matches!(self, Operation::Create(_)) => 2,
                ObjectType::VirtualService => 4,
            },
            Operation::Delete(entry) => match entry.object_type {
                ObjectType::VirtualService if entry.is_child_vs() => 5,
                ObjectType::VirtualService => 6,
                ObjectType::PoolGroup | ObjectType::HttpPolicySet => 7,
                ObjectType::SslKeyAndCertificate | ObjectType::Pool => 8,
            },
        }
    }
}

/// Minimal operations turning `realized` into `desired`, in apply order.
///
/// Objects whose stored checksum matches are left alone; an entry adopted
/// without a checksum is always rewritten.
pub fn plan(desired: &[LbObject], realized: &[CacheEntry]) -> Vec<Operation> {
    let cached: HashMap<ObjectRef, &CacheEntry> = realized.iter().map(|e| (e.object_ref(), e)).collect();

    let mut operations: Vec<Operation> = Vec::new();
    for object in desired {
        match cached.get(&object.object_ref()) {
            None => operations.push(Operation::Create(object.clone())),
            Some(entry) if entry.checksum.as_deref() != Some(object.checksum.as_str()) => {
                operations.push(Operation::Update { uuid: entry.uuid.clone(), object: object.clone() })
            }
            Some(_) => {}
        }
    }

    let mut stale: Vec<&CacheEntry> = realized
        .iter()
        .filter(|e| !desired.iter().any(|o| o.object_type == e.object_type && o.name == e.name))
        .collect();
    stale.sort_by(|a, b| a.object_ref().cmp(&b.object_ref()));
    operations.extend(stale.into_iter().cloned().map(Operation::Delete));

    operations.sort_by_key(Operation::stage);
    operations
}
