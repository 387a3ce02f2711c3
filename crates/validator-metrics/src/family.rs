// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::MetricsError;
use indexmap::IndexMap;
use prometheus_parse::{Sample, Scrape, Value};
use std::collections::HashSet;

/// Families with more samples than this are reduced as histograms even when
/// the exposition does not declare their type.
pub const HISTOGRAM_SAMPLE_THRESHOLD: usize = 10;

/// The histogram reduction reports the bucket holding this fraction of the
/// observations (the median).
pub const HISTOGRAM_QUANTILE: f64 = 0.5;

const BUCKET_SUFFIX: &str = "_bucket";
const LE_LABEL: &str = "le";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Untyped,
}

/// A single sample of a family. Histogram buckets carry their upper bound.
#[derive(Clone, Debug, PartialEq)]
pub struct FamilySample {
    pub le: Option<f64>,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub samples: Vec<FamilySample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
            samples: vec![],
        }
    }

    pub fn with_sample(mut self, le: Option<f64>, value: f64) -> Self {
        self.samples.push(FamilySample { le, value });
        self
    }

    pub fn is_histogram(&self) -> bool {
        self.kind == MetricKind::Histogram || self.samples.len() > HISTOGRAM_SAMPLE_THRESHOLD
    }

    /// Reduces the family to one scalar: the approximate median bucket bound
    /// for histograms, the first sample's value otherwise.
    pub fn reduce(&self) -> Option<f64> {
        if self.is_histogram() {
            self.median_bucket()
        } else {
            self.samples.first().map(|sample| sample.value)
        }
    }

    /// The last sample is the cumulative total. Returns the `le` bound of the
    /// first bucket whose cumulative count reaches half of that total.
    pub fn median_bucket(&self) -> Option<f64> {
        let total = self.samples.last()?.value;
        if !(total > 0.0) {
            return None;
        }
        let threshold = HISTOGRAM_QUANTILE * total;
        self.samples
            .iter()
            .filter(|sample| sample.le.is_some())
            .find(|sample| sample.value >= threshold)
            .and_then(|sample| sample.le)
    }
}

/// Parses Prometheus exposition text into families, keeping the order in
/// which families first appear. Samples sharing a metric name are merged.
/// Histogram buckets from several label sets are summed per bound, so the
/// result does not depend on the order the parser yields label sets in.
pub fn parse_families(text: &str) -> Result<Vec<MetricFamily>, MetricsError> {
    let lines = text.lines().map(|line| Ok(line.to_owned()));
    let scrape = Scrape::parse(lines).map_err(MetricsError::Parse)?;

    let mut families: IndexMap<String, MetricFamily> = IndexMap::new();
    for sample in scrape.samples {
        let Sample {
            metric,
            value,
            labels,
            ..
        } = sample;
        let le = labels.get(LE_LABEL).and_then(|le| parse_bound(le));
        let (name, kind, samples) = match value {
            Value::Histogram(buckets) => {
                let name = metric
                    .strip_suffix(BUCKET_SUFFIX)
                    .unwrap_or(&metric)
                    .to_string();
                let samples = buckets
                    .iter()
                    .map(|bucket| FamilySample {
                        le: Some(bucket.less_than),
                        value: bucket.count,
                    })
                    .collect();
                (name, MetricKind::Histogram, samples)
            },
            Value::Counter(value) | Value::Gauge(value) | Value::Untyped(value)
                if le.is_some() && metric.ends_with(BUCKET_SUFFIX) =>
            {
                // A bucket line the parser did not attach to a declared histogram.
                let name = metric.trim_end_matches(BUCKET_SUFFIX).to_string();
                (name, MetricKind::Histogram, vec![FamilySample { le, value }])
            },
            Value::Counter(value) => (metric, MetricKind::Counter, vec![FamilySample {
                le,
                value,
            }]),
            Value::Gauge(value) => (metric, MetricKind::Gauge, vec![FamilySample { le, value }]),
            Value::Untyped(value) => (metric, MetricKind::Untyped, vec![FamilySample {
                le,
                value,
            }]),
            // Summaries carry quantiles, not buckets, and are never requested.
            Value::Summary(_) => continue,
        };
        families
            .entry(name.clone())
            .or_insert_with(|| MetricFamily::new(name, kind))
            .samples
            .extend(samples);
    }
    Ok(families
        .into_values()
        .map(|mut family| {
            if family.kind == MetricKind::Histogram {
                family.samples = merge_buckets(family.samples);
            }
            family
        })
        .collect())
}

/// Sorts buckets by bound and adds up the cumulative counts of equal bounds.
fn merge_buckets(mut samples: Vec<FamilySample>) -> Vec<FamilySample> {
    samples.sort_by(|a, b| {
        let a = a.le.unwrap_or(f64::INFINITY);
        let b = b.le.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });
    let mut merged: Vec<FamilySample> = Vec::with_capacity(samples.len());
    for sample in samples {
        match merged.last_mut() {
            Some(last) if last.le == sample.le => last.value += sample.value,
            _ => merged.push(sample),
        }
    }
    merged
}

/// Parses the text and reduces the requested families. Families that are
/// missing, or histograms that never reach the threshold, produce no entry.
pub fn reduce_exposition(
    text: &str,
    metric_names: &HashSet<String>,
) -> Result<IndexMap<String, f64>, MetricsError> {
    let mut reduced = IndexMap::new();
    for family in parse_families(text)? {
        if !metric_names.contains(&family.name) {
            continue;
        }
        if let Some(value) = family.reduce() {
            reduced.insert(family.name, value);
        }
    }
    Ok(reduced)
}

fn parse_bound(bound: &str) -> Option<f64> {
    match bound {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"# HELP consensus_latency Time to commit a certificate
# TYPE consensus_latency histogram
consensus_latency_bucket{le="10"} 5
consensus_latency_bucket{le="50"} 60
consensus_latency_bucket{le="100"} 90
consensus_latency_bucket{le="+Inf"} 100
consensus_latency_sum 4000
consensus_latency_count 100
# HELP current_round The current round
# TYPE current_round gauge
current_round 42
# HELP certificates_created Number of created certificates
# TYPE certificates_created counter
certificates_created 1337
"#;

    fn names(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_histogram_reduces_to_median_bucket() {
        let family = MetricFamily::new("latency", MetricKind::Histogram)
            .with_sample(Some(10.0), 5.0)
            .with_sample(Some(50.0), 60.0)
            .with_sample(Some(100.0), 100.0);
        assert_eq!(family.reduce(), Some(50.0));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let family = MetricFamily::new("latency", MetricKind::Histogram)
            .with_sample(Some(10.0), 5.0)
            .with_sample(Some(50.0), 50.0)
            .with_sample(Some(100.0), 100.0);
        assert_eq!(family.reduce(), Some(50.0));

        let family = MetricFamily::new("latency", MetricKind::Histogram)
            .with_sample(Some(10.0), 5.0)
            .with_sample(Some(50.0), 40.0)
            .with_sample(Some(100.0), 100.0);
        assert_eq!(family.reduce(), Some(100.0));
    }

    #[test]
    fn test_gauge_passes_through_first_sample() {
        let family = MetricFamily::new("round", MetricKind::Gauge)
            .with_sample(None, 7.0)
            .with_sample(None, 8.0)
            .with_sample(None, 9.0);
        assert!(!family.is_histogram());
        assert_eq!(family.reduce(), Some(7.0));
    }

    #[test]
    fn test_large_untyped_family_is_a_histogram() {
        let mut family = MetricFamily::new("channel_latency_bucket", MetricKind::Untyped);
        for i in 1..=12 {
            family = family.with_sample(Some(i as f64 * 10.0), i as f64 * 10.0);
        }
        assert!(family.is_histogram());
        // Total is 120, so the first bucket at or above 60 wins.
        assert_eq!(family.reduce(), Some(60.0));
    }

    #[test]
    fn test_empty_histogram_has_no_entry() {
        let family = MetricFamily::new("latency", MetricKind::Histogram);
        assert_eq!(family.reduce(), None);

        let family = MetricFamily::new("latency", MetricKind::Histogram)
            .with_sample(Some(10.0), 0.0)
            .with_sample(Some(f64::INFINITY), 0.0);
        assert_eq!(family.reduce(), None);
    }

    #[test]
    fn test_parse_families() {
        let families = parse_families(EXPOSITION).unwrap();
        let histogram = families
            .iter()
            .find(|family| family.name == "consensus_latency")
            .unwrap();
        assert_eq!(histogram.kind, MetricKind::Histogram);
        assert_eq!(histogram.samples.len(), 4);
        assert_eq!(histogram.samples[3].le, Some(f64::INFINITY));

        let gauge = families
            .iter()
            .find(|family| family.name == "current_round")
            .unwrap();
        assert_eq!(gauge.kind, MetricKind::Gauge);
        assert_eq!(gauge.samples[0].value, 42.0);
    }

    #[test]
    fn test_untyped_buckets_form_a_histogram() {
        let text = "latency_bucket{le=\"1\"} 2\n\
                    latency_bucket{le=\"5\"} 9\n\
                    latency_bucket{le=\"+Inf\"} 10\n";
        let reduced = reduce_exposition(text, &names(&["latency"])).unwrap();
        assert_eq!(reduced.get("latency"), Some(&5.0));
    }

    #[test]
    fn test_histogram_label_sets_are_summed_per_bound() {
        let text = r#"# TYPE lat histogram
lat_bucket{peer="a",le="1"} 0
lat_bucket{peer="a",le="5"} 0
lat_bucket{peer="a",le="+Inf"} 0
lat_sum{peer="a"} 0
lat_count{peer="a"} 0
lat_bucket{peer="b",le="1"} 90
lat_bucket{peer="b",le="5"} 100
lat_bucket{peer="b",le="+Inf"} 100
lat_sum{peer="b"} 120
lat_count{peer="b"} 100
"#;
        for _ in 0..32 {
            let families = parse_families(text).unwrap();
            let lat = families.iter().find(|family| family.name == "lat").unwrap();
            assert_eq!(
                lat.samples,
                vec![
                    FamilySample { le: Some(1.0), value: 90.0 },
                    FamilySample { le: Some(5.0), value: 100.0 },
                    FamilySample { le: Some(f64::INFINITY), value: 100.0 },
                ]
            );
            let reduced = reduce_exposition(text, &names(&["lat"])).unwrap();
            assert_eq!(reduced.get("lat"), Some(&1.0));
        }
    }

    #[test]
    fn test_reduce_exposition_filters_requested_names() {
        let reduced = reduce_exposition(
            EXPOSITION,
            &names(&["consensus_latency", "current_round", "missing_metric"]),
        )
        .unwrap();
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced.get("consensus_latency"), Some(&50.0));
        assert_eq!(reduced.get("current_round"), Some(&42.0));
        assert!(!reduced.contains_key("certificates_created"));
    }
}
