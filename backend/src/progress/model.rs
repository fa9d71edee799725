use std::fmt;

use serde::{Deserialize, Serialize};

/// What a completion request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Module,
    Activity,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Module => "module",
            CompletionKind::Activity => "activity",
        }
    }

    /// Capitalized noun used in caller-facing messages.
    pub fn noun(&self) -> &'static str {
        match self {
            CompletionKind::Module => "Module",
            CompletionKind::Activity => "Activity",
        }
    }
}

impl fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified principal handed over by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    user_id: String,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Identifiers exactly as the caller sent them. Nothing here is trusted
/// until the service has validated it.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub kind: CompletionKind,
    pub course_id: Option<String>,
    pub module_id: Option<String>,
    pub activity_id: Option<String>,
    /// Reserved for answer validation. Carried through but never inspected:
    /// activity completion trusts the caller's claim.
    pub answer: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(kind: CompletionKind) -> Self {
        Self {
            kind,
            course_id: None,
            module_id: None,
            activity_id: None,
            answer: None,
        }
    }

    pub fn module(course_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id.into()),
            module_id: Some(module_id.into()),
            ..Self::new(CompletionKind::Module)
        }
    }

    pub fn activity(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        activity_id: impl Into<String>,
    ) -> Self {
        Self {
            course_id: Some(course_id.into()),
            module_id: Some(module_id.into()),
            activity_id: Some(activity_id.into()),
            ..Self::new(CompletionKind::Activity)
        }
    }
}

/// A validated completion target. `activity_id` is present iff the
/// request was an activity completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionTarget {
    pub course_id: String,
    pub module_id: String,
    pub activity_id: Option<String>,
}

impl CompletionTarget {
    /// The id progress is tracked against: the activity for activity
    /// completions, the module otherwise.
    pub fn target_id(&self) -> &str {
        self.activity_id.as_deref().unwrap_or(&self.module_id)
    }
}

/// Document key of a progress record: `{userId}_{targetId}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgressKey(String);

impl ProgressKey {
    pub fn new(user_id: &str, target_id: &str) -> Self {
        Self(format!("{user_id}_{target_id}"))
    }

    /// Wraps a key read back from the store as-is.
    pub fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable evidence that a user completed a module or activity.
/// Immutable once `is_completed` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressRecord {
    pub id: ProgressKey,
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub activity_id: Option<String>,
    pub is_completed: bool,
    /// Fixed at completion time from the catalog, never from the caller.
    pub points_earned: u64,
    /// Server clock, unix milliseconds.
    pub completed_at_ms: u64,
}

/// Authored module document from the `modules` collection.
///
/// Unknown fields (titles, content, ...) are ignored. A missing or null
/// `pointsReward` means no reward.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogModule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub points_reward: Option<u64>,
    #[serde(default)]
    pub activities: Vec<CatalogActivity>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogActivity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub points_reward: Option<u64>,
}

impl CatalogModule {
    /// Linear scan; modules carry a handful of activities.
    pub fn activity(&self, activity_id: &str) -> Option<&CatalogActivity> {
        self.activities.iter().find(|a| a.id == activity_id)
    }
}

/// Response returned to the caller on a successful completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub success: bool,
    pub points_earned: u64,
    pub message: String,
}

impl Receipt {
    pub fn new(kind: CompletionKind, points_earned: u64) -> Self {
        Self {
            success: true,
            points_earned,
            message: format!(
                "{} completed! You earned {} points.",
                kind.noun(),
                points_earned
            ),
        }
    }
}
