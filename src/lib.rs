//! Filter-and-aggregation pipeline behind the survey dashboards.
//!
//! A [`data::Dataset`] is filtered by a [`data::FilterSpec`] into a
//! [`data::FilteredView`], which is then grouped and reduced into
//! [`data::AggregationResult`]s and flattened for export. The
//! [`dashboard::Dashboard`] runs a configured set of such panels.

pub mod dashboard;
pub mod data;
