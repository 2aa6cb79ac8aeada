//! Enumerations shared by the job, source and finding records.
//!
//! Every enum is stored in Postgres as its `SCREAMING_SNAKE_CASE` text form
//! and serialized the same way over the API.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::InvalidEnum {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Survey,
    Valuation,
    Development,
}

text_enum!(JobType, "job type", {
    Survey => "SURVEY",
    Valuation => "VALUATION",
    Development => "DEVELOPMENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Complete,
}

text_enum!(JobStatus, "job status", {
    NotStarted => "NOT_STARTED",
    InProgress => "IN_PROGRESS",
    Complete => "COMPLETE",
});

impl JobStatus {
    /// Whether a job may move from `self` to `to`.
    ///
    /// Work must start before it completes; a completed job may be reopened.
    #[must_use]
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::NotStarted, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Complete)
                | (JobStatus::Complete, JobStatus::InProgress)
        )
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceCategory {
    Authoritative,
    Dataset,
    LocalGis,
    Indicative,
    Reference,
}

text_enum!(SourceCategory, "source category", {
    Authoritative => "AUTHORITATIVE",
    Dataset => "DATASET",
    LocalGis => "LOCAL_GIS",
    Indicative => "INDICATIVE",
    Reference => "REFERENCE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMode {
    Automated,
    Assisted,
}

text_enum!(SourceMode, "source mode", {
    Automated => "AUTOMATED",
    Assisted => "ASSISTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Pending,
    Complete,
    Failed,
}

text_enum!(FindingStatus, "finding status", {
    Pending => "PENDING",
    Complete => "COMPLETE",
    Failed => "FAILED",
});
