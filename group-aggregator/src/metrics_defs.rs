//! Metrics definitions for group aggregation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
    ($def:expr, $($key:expr => $value:expr),+ $(,)?) => {
        metrics::counter!($def.name, $($key => $value),+)
    };
}

macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

pub const GROUP_REQUESTS: MetricDef = MetricDef {
    name: "group.requests",
    metric_type: MetricType::Counter,
    description: "Group aggregations by outcome (merged, empty, not_found, error)",
};

pub const MEMBER_RESPONSES: MetricDef = MetricDef {
    name: "group.member.responses",
    metric_type: MetricType::Counter,
    description: "Member responses collected by the dispatcher, by status class",
};

pub const MERGE_DURATION: MetricDef = MetricDef {
    name: "group.merge.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent in the merge strategy in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[GROUP_REQUESTS, MEMBER_RESPONSES, MERGE_DURATION];

/// Buckets a status code for use as a low-cardinality metric tag
pub fn status_class(status: http::StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
