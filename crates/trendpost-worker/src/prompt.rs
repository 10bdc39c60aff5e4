use std::fmt::Write as _;

use trendpost_core::classifier::ChangeResult;
use trendpost_core::format;
use trendpost_core::metrics::TrackedMetric;
use trendpost_core::summary::AnalyticsSummary;

const TOP_BREAKDOWN_ROWS: usize = 3;
const PROMPT_INSIGHTS: usize = 3;
const PROMPT_RECOMMENDATIONS: usize = 2;

pub fn system_prompt() -> &'static str {
    "You are a web analytics consultant writing for busy decision makers. \
     Your reports are short and direct, and they focus on findings that call for action. \
     Do not pad the text and do not repeat figures the reader already has."
}

/// Renders the summary into the user prompt.
pub fn summary_prompt(summary: &AnalyticsSummary, website: &str) -> String {
    let period = summary.period();
    let mut out = format!(
        "Write a very brief analytics report for {website} (period: {} to {}, {} days).\n\nDATA:\n",
        period.start().format("%b %d"),
        period.end().format("%b %d, %Y"),
        summary.period_days()
    );

    for change in summary.metric_changes() {
        let _ = writeln!(out, "- {}", metric_line(change));
    }

    let sources: Vec<String> = summary
        .top_sources(TOP_BREAKDOWN_ROWS)
        .into_iter()
        .map(|row| row.label)
        .collect();
    if !sources.is_empty() {
        let _ = writeln!(out, "- Top sources: {}", sources.join(", "));
    }
    let locations: Vec<String> = summary
        .top_locations(TOP_BREAKDOWN_ROWS)
        .into_iter()
        .map(|row| row.label)
        .collect();
    if !locations.is_empty() {
        let _ = writeln!(out, "- Top locations: {}", locations.join(", "));
    }

    out.push_str("\nKEY INSIGHTS:\n");
    for insight in summary.insights().iter().take(PROMPT_INSIGHTS) {
        let _ = writeln!(out, "- {insight}");
    }

    out.push_str("\nRECOMMENDATIONS:\n");
    for recommendation in summary.recommendations().iter().take(PROMPT_RECOMMENDATIONS) {
        let _ = writeln!(out, "- {recommendation}");
    }

    out.push_str(
        "\nREQUIREMENTS:\n\
         - No heading; open with a 1-2 sentence summary of the overall state\n\
         - Then a \"## Key findings\" section with 1-3 bullet points, one sentence each\n\
         - Then a \"## Recommendations\" section with 1-2 bullet points, one sentence each\n\
         - At most 150 words in total\n\
         - Professional and direct tone\n\
         - No tables and no repetition of the metrics shown elsewhere in the email",
    );
    out
}

/// `Sessions: 1,000 (↑ +25.0% vs previous period)`
fn metric_line(change: &ChangeResult) -> String {
    let metric = TrackedMetric::from_key(&change.metric);
    let label = metric.map(|m| m.label()).unwrap_or(change.metric.as_str());
    let value = if metric.is_some_and(|m| m.is_percentage()) {
        format!("{:.1}%", change.current)
    } else {
        format::metric(change.current)
    };
    let trend = match change.delta_percent {
        Some(pct) => format!(
            "{} {} vs previous period",
            change.trend.arrow(),
            format::signed_percent(pct)
        ),
        None => format!("{} new this period", change.trend.arrow()),
    };
    format!("{label}: {value} ({trend})")
}
