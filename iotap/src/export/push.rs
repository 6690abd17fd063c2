//! Prometheus push-gateway export
//!
//! At the end of a run the per-kind totals are gathered into a private
//! [`Registry`] and PUT to `<gateway>/metrics/job/iotap/<label>/<value>...`,
//! so each distinct label set is its own group on the gateway.
//!
//! | metric           | labels | value |
//! |------------------|--------|-------|
//! | `iotap_runs`     |        | 1 per push |
//! | `iotap_io_calls` | `kind` | calls of that kind |
//! | `iotap_io_bytes` | `kind` | bytes of that kind |

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use log::info;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::collections::BTreeMap;

use crate::domain::ExportError;
use crate::probes::EventAggregator;

/// Push-gateway job name
pub const PUSH_JOB: &str = "iotap";

/// Label carried by the per-kind metrics; a run label may not reuse it
pub const KIND_LABEL: &str = "kind";

/// The metrics of one finished run
pub struct RunMetrics {
    registry: Registry,
}

impl RunMetrics {
    /// Gather the aggregator's totals
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered
    pub fn collect(aggregator: &EventAggregator) -> Result<Self, ExportError> {
        let registry = Registry::new();

        let runs = IntCounter::with_opts(Opts::new("iotap_runs", "iotap measuring runs"))?;
        let calls = IntCounterVec::new(
            Opts::new("iotap_io_calls", "I/O syscalls made by the target, per operation kind"),
            &[KIND_LABEL],
        )?;
        let bytes = IntCounterVec::new(
            Opts::new("iotap_io_bytes", "Bytes named by the target's I/O syscalls, per operation kind"),
            &[KIND_LABEL],
        )?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(bytes.clone()))?;

        runs.inc();
        for (kind, totals) in aggregator.active() {
            calls.with_label_values(&[kind.name()]).inc_by(totals.calls);
            bytes.with_label_values(&[kind.name()]).inc_by(totals.bytes);
        }

        Ok(Self { registry })
    }

    /// Prometheus text exposition format
    ///
    /// # Errors
    /// Returns an error if encoding fails
    pub fn encode(&self) -> Result<Vec<u8>, ExportError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Grouping URL for `labels` under `gateway`.
///
/// Values containing `/` use the gateway's `name@base64` form.
///
/// # Errors
/// Returns an error for a URL that cannot carry a path, or a label whose
/// key is not a valid Prometheus label name (or is `job`/`kind`)
pub fn grouping_url(gateway: &str, labels: &BTreeMap<String, String>) -> Result<Url, ExportError> {
    let invalid = |reason: &str| ExportError::InvalidGateway {
        url: gateway.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(gateway).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http or https URL"));
    }

    for key in labels.keys() {
        if !is_label_name(key) || key == "job" || key == KIND_LABEL {
            return Err(ExportError::InvalidMetricLabel(key.clone()));
        }
    }

    {
        let mut segments = url.path_segments_mut().map_err(|()| invalid("cannot be a base URL"))?;
        segments.pop_if_empty().extend(["metrics", "job", PUSH_JOB]);
        for (key, value) in labels {
            if value.contains('/') || value.is_empty() {
                segments.push(&format!("{key}@base64"));
                segments.push(&URL_SAFE.encode(value));
            } else {
                segments.push(key).push(value);
            }
        }
    }
    Ok(url)
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("__")
}

/// Replace the group at `url` with `metrics`
///
/// # Errors
/// Returns an error if the request fails or the gateway rejects it
pub async fn push_metrics(client: &Client, url: Url, metrics: &RunMetrics) -> Result<(), ExportError> {
    let body = metrics.encode()?;
    info!("Pushing {} bytes of metrics to {url}", body.len());

    client
        .put(url)
        .header(CONTENT_TYPE, TextEncoder::new().format_type())
        .body(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotap_common::{IoEvent, OperationKind};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    /// Sample lines of the text format, `name{labels}` -> value
    fn samples(metrics: &RunMetrics) -> BTreeMap<String, f64> {
        String::from_utf8(metrics.encode().unwrap())
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.rsplit_once(' '))
            .map(|(series, value)| (series.to_string(), value.parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_families_carry_per_kind_totals() {
        let mut agg = EventAggregator::new();
        agg.add(IoEvent::new(OperationKind::Write, 100));
        agg.add(IoEvent::new(OperationKind::Write, 28));
        agg.add(IoEvent::new(OperationKind::SendMsg, 60));

        let samples = samples(&RunMetrics::collect(&agg).unwrap());
        assert_eq!(samples["iotap_io_bytes{kind=\"WRITE\"}"], 128.0);
        assert_eq!(samples["iotap_io_calls{kind=\"WRITE\"}"], 2.0);
        assert_eq!(samples["iotap_io_bytes{kind=\"SENDMSG\"}"], 60.0);
        assert_eq!(samples["iotap_runs"], 1.0);
        // kinds never seen are not exported
        assert_eq!(samples.len(), 5);
    }

    #[test]
    fn test_encoded_text_format() {
        let mut agg = EventAggregator::new();
        agg.add(IoEvent::new(OperationKind::Read, 4096));
        let text = String::from_utf8(RunMetrics::collect(&agg).unwrap().encode().unwrap()).unwrap();

        assert!(text.contains("iotap_io_bytes{kind=\"READ\"} 4096"));
        assert!(text.contains("iotap_io_calls{kind=\"READ\"} 1"));
        assert!(text.contains("iotap_runs 1"));
    }

    #[test]
    fn test_grouping_url_carries_labels() {
        let url = grouping_url(
            "http://gw:9091/",
            &labels(&[("case", "tls"), ("transport", "stream")]),
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://gw:9091/metrics/job/iotap/case/tls/transport/stream");
    }

    #[test]
    fn test_grouping_url_base64_for_slashes() {
        let url = grouping_url("http://gw:9091", &labels(&[("path", "a/b")])).unwrap();
        assert_eq!(url.path(), format!("/metrics/job/iotap/path@base64/{}", URL_SAFE.encode("a/b")));
    }

    #[test]
    fn test_grouping_url_rejects_bad_labels_and_urls() {
        for key in ["job", "kind", "my-key", "__meta", "1st"] {
            assert!(matches!(
                grouping_url("http://gw:9091", &labels(&[(key, "x")])),
                Err(ExportError::InvalidMetricLabel(_))
            ));
        }
        assert!(matches!(
            grouping_url("not a url", &labels(&[])),
            Err(ExportError::InvalidGateway { .. })
        ));
        assert!(matches!(
            grouping_url("unix:/tmp/gw", &labels(&[])),
            Err(ExportError::InvalidGateway { .. })
        ));
    }
}
