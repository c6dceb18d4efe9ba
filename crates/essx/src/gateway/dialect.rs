//! 🗣️ Wire dialects — how each major version wants to be spoken to.
//!
//! Every dialect is a zero-sized marker type. [`super::ElasticsearchGateway`] is
//! generic over it, so the compiler stamps out one gateway per major version and
//! the differences below are the only code that differs.

use std::fmt::Debug;

use crate::connection::ClusterVersion;
use crate::schema::detect_legacy_type_wrapping;

/// 🔢 Where a template's `order` travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPlacement {
    /// Merged into the template body as `"order": n`.
    Body,
    /// Sent as `?order=n`.
    QueryParam,
}

pub trait WireDialect: Debug + Send + Sync + 'static {
    const VERSION: ClusterVersion;
    const TEMPLATE_ORDER: OrderPlacement;

    /// 🏷️ `include_type_name` for create-index and put-template. `None` omits it.
    fn type_name_flag(model: &str) -> Option<bool>;

    /// 🏷️ `include_type_name` for mapping reads and writes. `None` omits it.
    fn untyped_mapping_flag() -> Option<bool>;
}

/// 🦖 Elasticsearch 6.x: typed mappings are the norm, so we say what we mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es6;

impl WireDialect for Es6 {
    const VERSION: ClusterVersion = ClusterVersion::V6;
    const TEMPLATE_ORDER: OrderPlacement = OrderPlacement::Body;

    fn type_name_flag(model: &str) -> Option<bool> {
        detect_legacy_type_wrapping(model).include_type_name()
    }

    fn untyped_mapping_flag() -> Option<bool> {
        Some(false)
    }
}

/// 🦕 Elasticsearch 7.x: types are deprecated but still tolerated behind the flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es7;

impl WireDialect for Es7 {
    const VERSION: ClusterVersion = ClusterVersion::V7;
    const TEMPLATE_ORDER: OrderPlacement = OrderPlacement::Body;

    fn type_name_flag(model: &str) -> Option<bool> {
        detect_legacy_type_wrapping(model).include_type_name()
    }

    fn untyped_mapping_flag() -> Option<bool> {
        Some(false)
    }
}

/// 🐦 Elasticsearch 8.x: types are gone and the flag is a 400 waiting to happen.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es8;

impl WireDialect for Es8 {
    const VERSION: ClusterVersion = ClusterVersion::V8;
    const TEMPLATE_ORDER: OrderPlacement = OrderPlacement::QueryParam;

    fn type_name_flag(_model: &str) -> Option<bool> {
        None
    }

    fn untyped_mapping_flag() -> Option<bool> {
        None
    }
}
