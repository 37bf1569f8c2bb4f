// SPDX-License-Identifier: Apache-2.0

//! Per-cycle metric aggregation.

pub mod aggregator;

pub use aggregator::{nearest_rank, CycleAggregator, SourceSnapshot};
