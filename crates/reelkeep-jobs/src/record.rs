//! The job record contract.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use reelkeep_core::LibraryError;

use crate::id::JobId;

/// Lifecycle state shared by every job kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A record stored in a [`JobStore`](crate::JobStore).
///
/// The whole record is serialized on every checkpoint.
pub trait JobRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> JobId;

    fn status(&self) -> JobStatus;

    /// Move the job to [`JobStatus::Error`], keeping the error's kind and
    /// message.
    fn fail(&mut self, error: &LibraryError);

    fn is_finished(&self) -> bool {
        self.status().is_finished()
    }
}
