//! Prometheus text exposition format.
//!
//! Renders endpoint samples into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::collector::EndpointSample;

/// Render samples into Prometheus text format.
///
/// Produces GAUGE metrics with `endpoint` labels. Endpoints without a
/// measured latency are left out of the latency gauge.
pub fn render_prometheus(samples: &[EndpointSample]) -> String {
    let mut out = String::new();

    out.push_str(
        "# HELP dcstat_seconds_since_last_success Seconds since the last successful probe.\n",
    );
    out.push_str("# TYPE dcstat_seconds_since_last_success gauge\n");
    for s in samples {
        let _ = writeln!(
            out,
            "dcstat_seconds_since_last_success{{endpoint=\"{}\"}} {}",
            s.id,
            format_value(s.seconds_since_last_success)
        );
    }

    out.push_str("# HELP dcstat_endpoint_up Whether the endpoint answered recently (1) or not (0).\n");
    out.push_str("# TYPE dcstat_endpoint_up gauge\n");
    for s in samples {
        let _ = writeln!(
            out,
            "dcstat_endpoint_up{{endpoint=\"{}\"}} {}",
            s.id,
            u8::from(s.up)
        );
    }

    out.push_str("# HELP dcstat_probe_latency_seconds Round trip of the last successful probe.\n");
    out.push_str("# TYPE dcstat_probe_latency_seconds gauge\n");
    for s in samples {
        if let Some(latency) = s.latency_seconds {
            let _ = writeln!(
                out,
                "dcstat_probe_latency_seconds{{endpoint=\"{}\"}} {}",
                s.id,
                format_value(latency)
            );
        }
    }

    out.push_str("# HELP dcstat_endpoints Number of probed endpoints.\n");
    out.push_str("# TYPE dcstat_endpoints gauge\n");
    let _ = writeln!(out, "dcstat_endpoints {}", samples.len());

    out
}

fn format_value(v: f64) -> String {
    if v.is_infinite() {
        if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{v:.3}")
    }
}
