use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::clean::LoadReport;
use crate::config::DashboardConfig;
use crate::metrics::{self, ServiceScore, DEFAULT_TOP_BOTTOM};
use crate::models::CanonicalResponse;
use crate::query;

const RECENT_COMMENTS: usize = 5;

pub fn fmt_nps(nps: Option<i32>) -> String {
    match nps {
        Some(value) => format!("{value}%"),
        None => "n/a".to_string(),
    }
}

pub fn fmt_average(average: Option<f64>) -> String {
    match average {
        Some(value) => format!("{value:.1}"),
        None => "n/a".to_string(),
    }
}

/// Arrow plus magnitude. An undefined trend prints as `n/a`, never as zero.
pub fn fmt_trend(trend: Option<f64>) -> String {
    match trend {
        Some(delta) if delta > 0.0 => format!("↑ {:.1}", delta.abs()),
        Some(delta) if delta < 0.0 => format!("↓ {:.1}", delta.abs()),
        Some(_) => "− 0.0".to_string(),
        None => "n/a".to_string(),
    }
}

pub fn render_load_summary(report: &LoadReport) -> String {
    let mut output = String::new();
    if let Some(err) = &report.source_error {
        let _ = writeln!(output, "Data source unavailable: {err}");
        return output;
    }
    let _ = writeln!(
        output,
        "Loaded {} of {} rows ({} dropped: {} bad timestamp, {} bad score, {} unreadable).",
        report.kept_rows,
        report.total_rows,
        report.dropped_rows(),
        report.dropped_bad_timestamp,
        report.dropped_bad_score,
        report.unreadable_rows
    );
    if report.sentinel_corrections > 0 {
        let _ = writeln!(
            output,
            "Removed {} known placeholder values.",
            report.sentinel_corrections
        );
    }
    if !report.unmapped_columns.is_empty() {
        let _ = writeln!(
            output,
            "Unrecognized columns kept as-is: {}",
            report.unmapped_columns.join(", ")
        );
    }
    output
}

pub fn render_overview(responses: &[CanonicalResponse], config: &DashboardConfig) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## NPS Overview");

    let Some(comparison) = metrics::nps_month_over_month(responses) else {
        let _ = writeln!(output, "No responses available.");
        return output;
    };

    let delta = match comparison.delta {
        Some(d) if d >= 0 => format!("↑ {d}%"),
        Some(d) => format!("↓ {}%", d.abs()),
        None => "n/a".to_string(),
    };
    let _ = writeln!(
        output,
        "NPS for {}: {} ({} vs {})",
        comparison.current_month,
        fmt_nps(comparison.current_nps),
        delta,
        comparison.previous_month
    );
    let _ = writeln!(
        output,
        "Overall NPS: {} across {} responses",
        fmt_nps(metrics::global_nps(responses)),
        responses.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### Monthly Detail");
    for bucket in metrics::monthly_series(responses, config.representativeness_threshold) {
        let flag = if bucket.representative {
            ""
        } else {
            " (below representativeness threshold)"
        };
        let _ = writeln!(
            output,
            "- {}: NPS {} | {} promoters, {} passives, {} detractors | {} responses{}",
            bucket.month,
            fmt_nps(bucket.nps),
            bucket.counts.promoters,
            bucket.counts.passives,
            bucket.counts.detractors,
            bucket.responses,
            flag
        );
    }
    output
}

fn service_line(service: &ServiceScore) -> String {
    format!(
        "{:.1} - {} ({}, {} responses)",
        service.average,
        service.label,
        fmt_trend(service.trend),
        service.responses
    )
}

pub fn render_metrics(responses: &[CanonicalResponse], config: &DashboardConfig) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Satisfaction Metrics");
    let _ = writeln!(output, "Trends compare the latest month with the month before.");

    let ranking = metrics::top_bottom_services(responses, config, DEFAULT_TOP_BOTTOM);
    let _ = writeln!(output);
    let _ = writeln!(output, "### Strengths");
    if ranking.top.is_empty() {
        let _ = writeln!(output, "No rated services in this period.");
    }
    for service in &ranking.top {
        let _ = writeln!(output, "- {}", service_line(service));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Improvement Areas");
    if ranking.bottom.is_empty() {
        let _ = writeln!(output, "No rated services in this period.");
    }
    for service in &ranking.bottom {
        let _ = writeln!(output, "- {}", service_line(service));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### By Group");
    for group in metrics::group_averages(responses, config) {
        let _ = writeln!(
            output,
            "- {}: {} ({} rated criteria)",
            group.group,
            fmt_average(group.average),
            group.rated_criteria
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### All Services");
    let _ = writeln!(
        output,
        "| Service | Average | Satisfied | Neutral | Dissatisfied | Responses |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for criterion in &config.criteria {
        let breakdown = metrics::satisfaction_breakdown(responses, &criterion.key);
        let (satisfied, neutral, dissatisfied, count) = match &breakdown {
            Some(b) => (
                format!("{:.0}%", b.satisfied_pct),
                format!("{:.0}%", b.neutral_pct),
                format!("{:.0}%", b.dissatisfied_pct),
                b.responses,
            ),
            None => ("n/a".into(), "n/a".into(), "n/a".into(), 0),
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} |",
            criterion.label,
            fmt_average(metrics::criterion_average(responses, &criterion.key)),
            satisfied,
            neutral,
            dissatisfied,
            count
        );
    }
    output
}

pub fn render_responses(
    responses: &[CanonicalResponse],
    config: &DashboardConfig,
    anchor: Option<NaiveDateTime>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Responses");
    if responses.is_empty() {
        let _ = writeln!(output, "No responses match these filters.");
        return output;
    }

    let _ = writeln!(
        output,
        "NPS {} | resubscription {} | {} responses",
        fmt_nps(metrics::global_nps(responses)),
        fmt_average(metrics::resubscription_average(responses)),
        responses.len()
    );

    for response in responses {
        let marker = match anchor {
            Some(anchor) if query::is_recent(response, anchor) => "* ",
            _ => "",
        };
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "- {}{} {} | {} {}/10",
            marker,
            response.timestamp.format("%d/%m/%Y"),
            response.full_name().unwrap_or_else(|| "Anonymous".to_string()),
            response.category(),
            response.recommendation_score
        );
        if let Some(why) = response.comments.get("why_score") {
            let _ = writeln!(output, "  Why this score: \"{why}\"");
        }
        if let Some(score) = response.resubscription_score {
            let _ = write!(output, "  Resubscription: {score}/10");
            match response.comments.get("why_resubscription") {
                Some(why) => {
                    let _ = writeln!(output, " \"{why}\"");
                }
                None => {
                    let _ = writeln!(output);
                }
            }
        }
        let ratings: Vec<String> = config
            .criteria
            .iter()
            .filter_map(|c| {
                response
                    .satisfaction(&c.key)
                    .map(|score| format!("{} {}/5", c.label, score))
            })
            .collect();
        if !ratings.is_empty() {
            let _ = writeln!(output, "  Ratings: {}", ratings.join(", "));
        }
        if let Some(ideas) = response.comments.get("improvements") {
            let _ = writeln!(output, "  Suggested improvements: \"{ideas}\"");
        }
    }
    output
}

pub fn build_report(
    scope: &str,
    responses: &[CanonicalResponse],
    config: &DashboardConfig,
    load: &LoadReport,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# NPS Survey Report");
    let _ = writeln!(output, "Generated for {scope}");
    let _ = writeln!(output);
    output.push_str(&render_load_summary(load));
    let _ = writeln!(output);
    output.push_str(&render_overview(responses, config));
    let _ = writeln!(output);
    output.push_str(&render_metrics(responses, config));

    let mut recent: Vec<&CanonicalResponse> = responses
        .iter()
        .filter(|r| r.comments.contains_key("why_score"))
        .collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Comments");
    if recent.is_empty() {
        let _ = writeln!(output, "No comments recorded for this period.");
    } else {
        for response in recent.iter().take(RECENT_COMMENTS) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                response.full_name().unwrap_or_else(|| "Anonymous".to_string()),
                response.category(),
                response.timestamp.date(),
                response.comments.get("why_score").map(String::as_str).unwrap_or_default()
            );
        }
    }

    output
}
