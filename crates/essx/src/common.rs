//! 📦 Common data structures — the nouns of essx.
//!
//! 🎬 COLD OPEN — INT. PLATFORM TEAM STANDUP — 9:02 AM
//!
//! "Who changed the mapping on `orders`?" Silence. Somebody coughs. The mapping
//! lives in a YAML file, the YAML file lives in git, and git says it was the CI bot.
//! The CI bot does not attend standup. 🦆
//!
//! This module holds the desired objects (what someone *wants* the cluster to look
//! like), the observed status (what we last *saw* happen), and the tiny enums that
//! glue the two together. No I/O. No opinions. Just shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 🏷️ The three kinds of schema objects we know how to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Index,
    Template,
    Pipeline,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectKind::Index => "Index",
            ObjectKind::Template => "Template",
            ObjectKind::Pipeline => "Pipeline",
        };
        f.write_str(label)
    }
}

/// 📡 A desired Elasticsearch index.
///
/// `name` and `number_of_shards` are immutable once the index exists remotely.
/// `number_of_replicas` and the mapping properties (additively) are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// 🔒 Opaque reference to a connection; resolved by the host, never by us.
    pub connection: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// 📦 The raw index body: `aliases`, `mappings`, `settings`.
    pub model: String,
}

/// 🧩 A desired legacy index template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub connection: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// 🔢 Template priority. `None` lets the cluster pick its default.
    #[serde(default)]
    pub order: Option<i64>,
    /// 📦 `aliases`, `mappings`, `settings`, `index_patterns`, `version`.
    pub model: String,
}

/// 🚰 A desired ingest pipeline. No shards, no replicas, no drama.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub connection: String,
    /// 📦 `description` + `processors`.
    pub model: String,
}

/// 🎭 One desired object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DesiredObject {
    Index(IndexSpec),
    Template(TemplateSpec),
    Pipeline(PipelineSpec),
}

impl DesiredObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            DesiredObject::Index(_) => ObjectKind::Index,
            DesiredObject::Template(_) => ObjectKind::Template,
            DesiredObject::Pipeline(_) => ObjectKind::Pipeline,
        }
    }

    /// 🎯 The target name on the remote cluster.
    pub fn name(&self) -> &str {
        match self {
            DesiredObject::Index(spec) => &spec.name,
            DesiredObject::Template(spec) => &spec.name,
            DesiredObject::Pipeline(spec) => &spec.name,
        }
    }

    pub fn connection(&self) -> &str {
        match self {
            DesiredObject::Index(spec) => &spec.connection,
            DesiredObject::Template(spec) => &spec.connection,
            DesiredObject::Pipeline(spec) => &spec.connection,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            DesiredObject::Index(spec) => &spec.model,
            DesiredObject::Template(spec) => &spec.model,
            DesiredObject::Pipeline(spec) => &spec.model,
        }
    }

    pub(crate) fn model_mut(&mut self) -> &mut String {
        match self {
            DesiredObject::Index(spec) => &mut spec.model,
            DesiredObject::Template(spec) => &mut spec.model,
            DesiredObject::Pipeline(spec) => &mut spec.model,
        }
    }

    /// 🔢 `(shards, replicas)` for the kinds that have them.
    pub fn shards_and_replicas(&self) -> Option<(u32, u32)> {
        match self {
            DesiredObject::Index(spec) => Some((spec.number_of_shards, spec.number_of_replicas)),
            DesiredObject::Template(spec) => {
                Some((spec.number_of_shards, spec.number_of_replicas))
            }
            DesiredObject::Pipeline(_) => None,
        }
    }
}

/// 🚦 Where a desired object landed after a convergence pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceState {
    /// ✅ Remote matches desired. Nothing scheduled.
    Created,
    /// 🔄 Transient trouble. Check again soon.
    Retry,
    /// 💀 Terminal until the desired object changes.
    Error,
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConvergenceState::Created => "Created",
            ConvergenceState::Retry => "Retry",
            ConvergenceState::Error => "Error",
        };
        f.write_str(label)
    }
}

/// 📋 The host-visible record of the last convergence outcome.
///
/// Always replaced wholesale, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedStatus {
    pub state: ConvergenceState,
    /// 📡 Last HTTP status from the cluster. Absent for engine-made verdicts
    /// and for calls that never got a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

impl ObservedStatus {
    pub fn created(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            state: ConvergenceState::Created,
            code,
            message: message.into(),
        }
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            state: ConvergenceState::Retry,
            code: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: ConvergenceState::Error,
            code: None,
            message: message.into(),
        }
    }

    /// 🔍 Should this status overwrite `prior` in the host's record?
    ///
    /// Yes when the state moved, or when the message moved while we were not
    /// sitting comfortably in `Created`. A stable `Created` never rewrites itself.
    pub fn supersedes(&self, prior: Option<&ObservedStatus>) -> bool {
        match prior {
            None => true,
            Some(prior) => {
                prior.state != self.state
                    || (prior.state != ConvergenceState::Created && prior.message != self.message)
            }
        }
    }
}
