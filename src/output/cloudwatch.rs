//! AWS CloudWatch through the rusoto client.
//!
//! Metrics go up in batches of at most twenty, one `PutMetricData` request per
//! batch. Credentials come from the usual AWS provider chain. A dry run prints
//! each batch as a JSON `MetricData` array instead of sending it.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{OptionSpec, Output, OutputContext, OutputError, OutputKind};
use rusoto_cloudwatch::CloudWatch as RusotoCloudWatch;
use rusoto_cloudwatch::{CloudWatchClient, MetricDatum, PutMetricDataInput};
use rusoto_core::Region;
use serde_json;
use std::io::{self, Write};
use std::str::FromStr;
use time;

const DEFAULT_NAMESPACE: &str = "logster";

/// The most datums `PutMetricData` accepts in one call.
pub const BATCH_SIZE: usize = 20;

/// Registry entry for `cloudwatch`.
pub const KIND: OutputKind = OutputKind {
    shortname: "cloudwatch",
    options: &[
        OptionSpec {
            name: "cloudwatch-namespace",
            value_name: "NAMESPACE",
            help: "CloudWatch namespace to publish under. Default is logster",
        },
        OptionSpec {
            name: "aws-region",
            value_name: "REGION",
            help: "AWS region, e.g. us-east-1. Defaults to AWS_DEFAULT_REGION, then us-east-1",
        },
    ],
    build: CloudWatch::build,
};

/// Dry run rendering of one `MetricDatum`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Datum<'a> {
    metric_name: &'a str,
    value: Option<f64>,
    unit: Option<&'a str>,
    timestamp: Option<&'a str>,
}

/// CloudWatch's name for a logster units label.
pub fn cloudwatch_unit(units: &str) -> &str {
    match units {
        "" => "None",
        "Requests" => "Count",
        other => other,
    }
}

/// Publishes a snapshot to one CloudWatch namespace.
pub struct CloudWatch {
    namespace: String,
    region: Region,
    ctx: OutputContext,
}

impl CloudWatch {
    /// Publish under `namespace` in `region`.
    pub fn new(namespace: &str, region: Region, ctx: OutputContext) -> CloudWatch {
        CloudWatch {
            namespace: namespace.to_string(),
            region: region,
            ctx: ctx,
        }
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let namespace = settings
            .get("cloudwatch-namespace")
            .unwrap_or(DEFAULT_NAMESPACE);
        if namespace.is_empty() {
            return Err(ConfigError::Invalid {
                option: "cloudwatch-namespace".to_string(),
                value: namespace.to_string(),
                reason: "namespace may not be empty".to_string(),
            });
        }
        let region = match settings.get("aws-region").filter(|r| !r.is_empty()) {
            Some(name) => Region::from_str(name).map_err(|e| ConfigError::Invalid {
                option: "aws-region".to_string(),
                value: name.to_string(),
                reason: format!("{}", e),
            })?,
            None => Region::default(),
        };
        Ok(Box::new(CloudWatch::new(namespace, region, ctx.clone())))
    }

    /// The region requests go to.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// One datum per metric, named with the prefix and suffix applied.
    pub fn datum(&self, metric: &MetricValue) -> Result<MetricDatum, OutputError> {
        let timestamp = time::format_rfc3339(metric.timestamp()).ok_or_else(|| {
            OutputError::Encode(format!("timestamp out of range: {}", metric.timestamp()))
        })?;
        Ok(MetricDatum {
            metric_name: self.ctx.metric_name(metric),
            value: Some(metric.value()),
            unit: Some(cloudwatch_unit(metric.units()).to_string()),
            timestamp: Some(timestamp),
            ..MetricDatum::default()
        })
    }

    /// The `PutMetricData` requests for `metrics`, at most `BATCH_SIZE` datums
    /// each.
    pub fn requests(&self, metrics: &[MetricValue]) -> Result<Vec<PutMetricDataInput>, OutputError> {
        let mut requests = Vec::with_capacity(metrics.len() / BATCH_SIZE + 1);
        for batch in metrics.chunks(BATCH_SIZE) {
            let mut data = Vec::with_capacity(batch.len());
            for m in batch {
                data.push(self.datum(m)?);
            }
            requests.push(PutMetricDataInput {
                metric_data: data,
                namespace: self.namespace.clone(),
            });
        }
        Ok(requests)
    }

    /// A request's `MetricData` as JSON.
    pub fn metric_data_json(request: &PutMetricDataInput) -> Result<String, OutputError> {
        let data: Vec<Datum> = request
            .metric_data
            .iter()
            .map(|d| Datum {
                metric_name: &d.metric_name,
                value: d.value,
                unit: d.unit.as_ref().map(|s| s.as_str()),
                timestamp: d.timestamp.as_ref().map(|s| s.as_str()),
            })
            .collect();
        serde_json::to_string(&data).map_err(|e| OutputError::Encode(format!("{}", e)))
    }

    /// Send `metrics`, or under a dry run print one line per request.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        let requests = self.requests(metrics)?;
        if self.ctx.dry_run {
            for request in &requests {
                writeln!(
                    echo,
                    "{} {} {}",
                    self.region.name(),
                    request.namespace,
                    CloudWatch::metric_data_json(request)?
                )?;
            }
            return Ok(());
        }
        if requests.is_empty() {
            return Ok(());
        }

        let client = CloudWatchClient::new(self.region.clone());
        for request in requests {
            let count = request.metric_data.len();
            client
                .put_metric_data(request)
                .sync()
                .map_err(|e| OutputError::Service(format!("{}", e)))?;
            debug!(
                "wrote {} datums to cloudwatch namespace {}",
                count, self.namespace
            );
        }
        Ok(())
    }
}

impl Output for CloudWatch {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}
