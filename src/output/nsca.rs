//! Nagios passive checks through `send_nsca`.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{parse_host_port, require, run_command, shell_words, OptionSpec, Output, OutputContext, OutputError,
             OutputKind};
use std::io::{self, Write};

/// Every metric is reported with the OK return code.
const RETURN_CODE: u8 = 0;

/// Registry entry for `nsca`.
pub const KIND: OutputKind = OutputKind {
    shortname: "nsca",
    options: &[
        OptionSpec {
            name: "nsca-host",
            value_name: "HOST[:PORT]",
            help: "Hostname and optional port for NSCA daemon, e.g. nsca.example.com:5667",
        },
        OptionSpec {
            name: "nsca-service-hostname",
            value_name: "HOST",
            help: "<host_name> value to use when sending to NSCA",
        },
    ],
    build: Nsca::build,
};

/// Pipes a snapshot into one `send_nsca` run.
pub struct Nsca {
    program: String,
    host: String,
    port: Option<u16>,
    service_hostname: String,
    ctx: OutputContext,
}

impl Nsca {
    /// Report to the daemon at `host`, which may carry a `:port`, as
    /// `service_hostname`.
    pub fn new(host: &str, service_hostname: &str, ctx: OutputContext) -> Result<Nsca, ConfigError> {
        let (host, port) = if host.contains(':') {
            let (h, p) = parse_host_port("nsca-host", host)?;
            (h, Some(p))
        } else {
            (host.to_string(), None)
        };
        Ok(Nsca {
            program: "send_nsca".to_string(),
            host: host,
            port: port,
            service_hostname: service_hostname.to_string(),
            ctx: ctx,
        })
    }

    /// Run `program` instead of `send_nsca`.
    pub fn with_program(mut self, program: &str) -> Nsca {
        self.program = program.to_string();
        self
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let host = require(settings, KIND.shortname, "nsca-host")?;
        let service_hostname = require(settings, KIND.shortname, "nsca-service-hostname")?;
        Ok(Box::new(Nsca::new(host, service_hostname, ctx.clone())?))
    }

    /// One tab separated passive check result.
    pub fn format(&self, metric: &MetricValue) -> String {
        format!(
            "{}\t{}\t{}\t{}\n",
            self.service_hostname,
            self.ctx.metric_name(metric),
            RETURN_CODE,
            metric.fmt_value()
        )
    }

    /// Arguments to `send_nsca`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-H".to_string(), self.host.clone()];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args
    }

    /// Pipe every metric into `send_nsca`, or under a dry run print the
    /// command line followed by its input.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        let mut input = String::with_capacity(metrics.len() * 64);
        for m in metrics {
            input.push_str(&self.format(m));
        }
        if self.ctx.dry_run {
            writeln!(echo, "{}", shell_words(&self.program, &self.args()))?;
            write!(echo, "{}", input)?;
            return Ok(());
        }
        if metrics.is_empty() {
            return Ok(());
        }
        run_command(&self.program, &self.args(), Some(input.as_bytes()))
    }
}

impl Output for Nsca {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::{self, File};
    use std::io::Read;
    use std::os::unix::fs::PermissionsExt;
    use tempdir::TempDir;

    #[test]
    fn build_requires_both_options() {
        let mut s = Settings::new();
        s.insert("nsca-host", "nagios");
        match Nsca::build(&s, &OutputContext::default()) {
            Err(ConfigError::Missing { option, .. }) => assert_eq!(option, "nsca-service-hostname"),
            _ => panic!("expected Missing"),
        }
        s.insert("nsca-service-hostname", "web01");
        assert!(Nsca::build(&s, &OutputContext::default()).is_ok());
    }

    #[test]
    fn format_is_tab_separated() {
        let n = Nsca::new("nagios", "web01", OutputContext::default()).unwrap();
        let m = MetricValue::new("latency.max", 250.0);
        assert_eq!(n.format(&m), "web01\tlatency.max\t0\t250\n");
    }

    #[test]
    fn dry_run_prints_command_and_input() {
        let ctx = OutputContext {
            dry_run: true,
            ..OutputContext::default()
        };
        let n = Nsca::new("nagios", "web01", ctx).unwrap();
        let mut buf = Vec::new();
        n.submit_to(&[MetricValue::new("a", 1.0), MetricValue::new("b", 2.0)], &mut buf)
            .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "send_nsca -H nagios\nweb01\ta\t0\t1\nweb01\tb\t0\t2\n"
        );
    }

    #[test]
    fn host_port_becomes_separate_flags() {
        let ctx = OutputContext {
            dry_run: true,
            ..OutputContext::default()
        };
        let mut s = Settings::new();
        s.insert("nsca-host", "nagios.example.com:5667");
        s.insert("nsca-service-hostname", "web01");
        let out = Nsca::build(&s, &ctx).unwrap();
        assert_eq!(out.shortname(), "nsca");

        let n = Nsca::new("nagios.example.com:5667", "web01", ctx).unwrap();
        assert_eq!(n.args(), vec!["-H", "nagios.example.com", "-p", "5667"]);
        let mut buf = Vec::new();
        n.submit_to(&[MetricValue::new("a", 1.0)], &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "send_nsca -H nagios.example.com -p 5667\nweb01\ta\t0\t1\n"
        );

        s.insert("nsca-host", "nagios.example.com:");
        assert!(Nsca::build(&s, &OutputContext::default()).is_err());
        s.insert("nsca-host", "nagios.example.com:99999");
        match Nsca::build(&s, &OutputContext::default()) {
            Err(ConfigError::Invalid { option, .. }) => assert_eq!(option, "nsca-host"),
            _ => panic!("expected Invalid"),
        }
    }

    #[test]
    fn pipes_into_program() {
        let dir = TempDir::new("logster-nsca").unwrap();
        let script = dir.path().join("send_nsca");
        let mut fp = File::create(&script).unwrap();
        write!(
            fp,
            "#!/bin/sh\necho \"$@\" > {0}/args\ncat > {0}/input\n",
            dir.path().display()
        ).unwrap();
        drop(fp);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let n = Nsca::new("nagios.example.com:5667", "web01", OutputContext::default())
            .unwrap()
            .with_program(script.to_str().unwrap());
        n.submit_to(&[MetricValue::new("a", 1.0), MetricValue::new("b", 2.5)], &mut Vec::new())
            .unwrap();

        let mut args = String::new();
        File::open(dir.path().join("args"))
            .unwrap()
            .read_to_string(&mut args)
            .unwrap();
        assert_eq!(args, "-H nagios.example.com -p 5667\n");
        let mut input = String::new();
        File::open(dir.path().join("input"))
            .unwrap()
            .read_to_string(&mut input)
            .unwrap();
        assert_eq!(input, "web01\ta\t0\t1\nweb01\tb\t0\t2.5\n");
    }

    #[test]
    fn failing_program_is_an_error() {
        let n = Nsca::new("nagios", "web01", OutputContext::default())
            .unwrap()
            .with_program("false");
        assert!(n.submit_to(&[MetricValue::new("a", 1.0)], &mut Vec::new()).is_err());
    }
}
