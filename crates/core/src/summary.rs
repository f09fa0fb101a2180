//! Summary metric
//!
//! The `prometheus` crate has no summary type. This one tracks `_sum` and
//! `_count` per label set and exposes them as a `summary` family without
//! quantiles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use prometheus::core::{Atomic, AtomicF64, AtomicU64, Collector, Desc};
use prometheus::proto;

use crate::metric::MetricOpts;

struct SummaryCore {
    sum: AtomicF64,
    count: AtomicU64,
}

impl SummaryCore {
    fn new() -> Self {
        Self {
            sum: AtomicF64::new(0.0),
            count: AtomicU64::new(0),
        }
    }
}

/// Handle to one labelled summary series
#[derive(Clone)]
pub struct Summary {
    core: Arc<SummaryCore>,
}

impl Summary {
    pub fn observe(&self, value: f64) {
        self.core.sum.inc_by(value);
        self.core.count.inc_by(1);
    }

    pub fn get_sample_sum(&self) -> f64 {
        self.core.sum.get()
    }

    pub fn get_sample_count(&self) -> u64 {
        self.core.count.get()
    }
}

struct SummaryVecInner {
    desc: Desc,
    children: RwLock<HashMap<Vec<String>, Arc<SummaryCore>>>,
}

/// A summary partitioned by label values
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryVecInner>,
}

impl SummaryVec {
    pub fn new(opts: &MetricOpts) -> prometheus::Result<Self> {
        let desc = Desc::new(
            opts.fq_name(),
            opts.help.clone(),
            opts.label_names.clone(),
            HashMap::new(),
        )?;

        Ok(Self {
            inner: Arc::new(SummaryVecInner {
                desc,
                children: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Return the series for `values`, creating it on first use.
    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<Summary> {
        let expected = self.inner.desc.variable_labels.len();
        if values.len() != expected {
            return Err(prometheus::Error::InconsistentCardinality {
                expect: expected,
                got: values.len(),
            });
        }

        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();

        {
            let children = self
                .inner
                .children
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(core) = children.get(&key) {
                return Ok(Summary { core: core.clone() });
            }
        }

        let mut children = self
            .inner
            .children
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let core = children
            .entry(key)
            .or_insert_with(|| Arc::new(SummaryCore::new()))
            .clone();
        Ok(Summary { core })
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let desc = &self.inner.desc;
        let children = self
            .inner
            .children
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut family = proto::MetricFamily::default();
        family.set_name(desc.fq_name.clone());
        family.set_help(desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);

        for (values, core) in children.iter() {
            let mut pairs: Vec<proto::LabelPair> = desc
                .variable_labels
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let mut pair = proto::LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut summary = proto::Summary::default();
            summary.set_sample_sum(core.sum.get());
            summary.set_sample_count(core.count.get());

            let mut metric = proto::Metric::default();
            metric.set_label(pairs.into());
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, Registry, TextEncoder};

    fn opts(labels: &[&str]) -> MetricOpts {
        MetricOpts::new("payload_bytes", "Observed payload sizes").labels(labels.iter().copied())
    }

    #[test]
    fn test_observe_accumulates_sum_and_count() {
        let summary = SummaryVec::new(&opts(&["route"])).unwrap();
        let series = summary.get_metric_with_label_values(&["/a"]).unwrap();
        series.observe(1.5);
        series.observe(2.5);

        let again = summary.get_metric_with_label_values(&["/a"]).unwrap();
        assert_eq!(again.get_sample_count(), 2);
        assert_eq!(again.get_sample_sum(), 4.0);
    }

    #[test]
    fn test_label_cardinality_is_checked() {
        let summary = SummaryVec::new(&opts(&["route", "method"])).unwrap();
        assert!(summary.get_metric_with_label_values(&["/a"]).is_err());
    }

    #[test]
    fn test_exposition_contains_sum_and_count() {
        let summary = SummaryVec::new(&opts(&["route"])).unwrap();
        summary
            .get_metric_with_label_values(&["/a"])
            .unwrap()
            .observe(3.0);

        let registry = Registry::new();
        registry.register(Box::new(summary.clone())).unwrap();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("# TYPE payload_bytes summary"));
        assert!(text.contains("payload_bytes_sum{route=\"/a\"} 3"));
        assert!(text.contains("payload_bytes_count{route=\"/a\"} 1"));
    }
}
