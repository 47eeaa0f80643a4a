//! Authorization scope as a pure predicate over caller and document.
//!
//! Stores apply [`AccessPolicy::can_read`] to candidate documents before any
//! similarity scoring, so a document outside the caller's scope can never
//! surface in results regardless of how well it matches.

use crate::document::DocumentRecord;
use crate::types::{Caller, CallerRole};

pub trait AccessPolicy: Send + Sync {
    fn can_read(&self, caller: &Caller, document: &DocumentRecord) -> bool;

    /// Metadata edits, content replacement and deletion.
    fn can_write(&self, caller: &Caller, document: &DocumentRecord) -> bool {
        caller.role == CallerRole::Admin || document.created_by == caller.user_id
    }

    fn can_create(&self, caller: &Caller) -> bool {
        matches!(caller.role, CallerRole::Doctor | CallerRole::Admin)
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&Caller, &DocumentRecord) -> bool + Send + Sync,
{
    fn can_read(&self, caller: &Caller, document: &DocumentRecord) -> bool {
        self(caller, document)
    }
}

/// Default role rules for the portal.
///
/// - admins and the document's creator see everything
/// - documents without a department that are not sensitive are public
/// - doctors see every document of their own department
/// - nurses see non-sensitive documents of their own department
/// - any other role sees public documents only
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn can_read(&self, caller: &Caller, document: &DocumentRecord) -> bool {
        if caller.role == CallerRole::Admin || document.created_by == caller.user_id {
            return true;
        }
        if document.department.is_none() && !document.is_sensitive {
            return true;
        }
        let same_department = matches!(
            (&caller.department, &document.department),
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
        );
        match caller.role {
            CallerRole::Doctor => same_department,
            CallerRole::Nurse => same_department && !document.is_sensitive,
            CallerRole::Admin | CallerRole::Staff => false,
        }
    }
}
