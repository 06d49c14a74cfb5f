use shared::metrics_defs::{MetricDef, MetricType};

pub const EVENTS_RECEIVED: MetricDef = MetricDef {
    name: "events.received",
    metric_type: MetricType::Counter,
    description: "Inbound position events. Tagged with outcome.",
};

pub const DELIVERIES: MetricDef = MetricDef {
    name: "deliveries",
    metric_type: MetricType::Counter,
    description: "Destination deliveries attempted. Tagged with kind, outcome.",
};

pub const DELIVERY_DURATION: MetricDef = MetricDef {
    name: "delivery.duration",
    metric_type: MetricType::Histogram,
    description: "Delivery duration in seconds. Tagged with kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[EVENTS_RECEIVED, DELIVERIES, DELIVERY_DURATION];
