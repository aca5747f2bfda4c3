use std::collections::BTreeSet;
use uuid::Uuid;

use super::error::ResultsError;
use super::store::Directory;
use crate::auth::{Caller, Role};

/// What a caller may read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Principal: every record
    Unrestricted,
    /// Student: only rows belonging to their own profile
    OwnRecordsOnly { student_id: Uuid },
    /// Teacher: rows whose (class, subject) pair is one of their assignments
    AssignedClassSubjects {
        teacher_id: Uuid,
        pairs: BTreeSet<(Uuid, Uuid)>,
    },
}

impl Scope {
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Unrestricted => "unrestricted",
            Scope::OwnRecordsOnly { .. } => "own-records",
            Scope::AssignedClassSubjects { .. } => "assigned-class-subjects",
        }
    }

    /// Whether a row of this student's class and subject falls inside the scope.
    /// Own-record scopes are checked by student id, not by pair.
    pub fn permits_pair(&self, class_id: Option<Uuid>, subject_id: Uuid) -> bool {
        match self {
            Scope::Unrestricted => true,
            Scope::OwnRecordsOnly { .. } => false,
            Scope::AssignedClassSubjects { pairs, .. } => {
                class_id.is_some_and(|class_id| pairs.contains(&(class_id, subject_id)))
            }
        }
    }

    pub fn permits_record(&self, student_id: Uuid, class_id: Option<Uuid>, subject_id: Uuid) -> bool {
        match self {
            Scope::OwnRecordsOnly { student_id: own } => *own == student_id,
            _ => self.permits_pair(class_id, subject_id),
        }
    }

    pub fn can_write(&self) -> bool {
        !matches!(self, Scope::OwnRecordsOnly { .. })
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Scope::Unrestricted)
    }
}

/// Turn a verified caller into a scope.
///
/// A valid credential whose student/teacher profile is missing is a data
/// integrity fault and reported as `NotFound`, not as a permission denial.
pub async fn resolve_scope(directory: &dyn Directory, caller: &Caller) -> Result<Scope, ResultsError> {
    if caller.user_id.is_nil() {
        return Err(ResultsError::Authentication("credential does not identify a user".to_string()));
    }

    let scope = match caller.role {
        Role::Principal => Scope::Unrestricted,
        Role::Student => {
            let student_id = directory
                .student_id_for_user(caller.user_id)
                .await?
                .ok_or_else(|| ResultsError::not_found(format!("no student profile for user {}", caller.user_id)))?;
            Scope::OwnRecordsOnly { student_id }
        }
        Role::Teacher => {
            let teacher_id = directory
                .teacher_id_for_user(caller.user_id)
                .await?
                .ok_or_else(|| ResultsError::not_found(format!("no teacher profile for user {}", caller.user_id)))?;
            let pairs = directory
                .teaching_assignments(teacher_id)
                .await?
                .into_iter()
                .map(|a| (a.class_id, a.subject_id))
                .collect();
            Scope::AssignedClassSubjects { teacher_id, pairs }
        }
    };

    tracing::debug!("Resolved {} scope for {} {}", scope.label(), caller.role, caller.user_id);
    Ok(scope)
}
