// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Road network location referencing.
//!
//! Loads road link sequences and positioned features from an embedded store,
//! builds a directed road graph from them and turns feature extents into
//! location references for downstream consumers.

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

pub mod catalog;
pub mod config;
pub mod coord_conversion;
pub mod geometry_utils;
pub mod models;
pub mod openlr;
pub mod regeneration;
pub mod roadnet;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

/// Projected reference system of stored link geometry (UTM zone 33N).
pub const UTM33_SRID: u32 = 25833;
pub const WGS_84_SRID: u32 = 4326;
