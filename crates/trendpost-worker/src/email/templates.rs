use std::fmt::Write as _;

use chrono::DateTime;
use chrono_tz::Tz;
use html_escape::encode_text;
use pulldown_cmark::{html, Event, Parser};
use trendpost_core::classifier::{ChangeResult, Trend};
use trendpost_core::format;
use trendpost_core::metrics::TrackedMetric;
use trendpost_core::period::ReportPeriod;
use trendpost_core::summary::AnalyticsSummary;

const TABLE_SOURCES: usize = 5;
const RULE: &str = "───────────────────────────────────────────────────────────";
const DOUBLE_RULE: &str = "═══════════════════════════════════════════════════════════";

/// `[Analytics Report] example.com - Sep 01 to Sep 30, 2026`
pub fn subject(prefix: &str, website: &str, period: ReportPeriod) -> String {
    format!(
        "{prefix} {website} - {} to {}",
        period.start().format("%b %d"),
        period.end().format("%b %d, %Y")
    )
}

fn long_period(period: ReportPeriod) -> String {
    format!(
        "{} - {}",
        period.start().format("%B %d, %Y"),
        period.end().format("%B %d, %Y")
    )
}

fn generated_line(generated_at: &DateTime<Tz>) -> String {
    format!(
        "Generated on {}",
        generated_at.format("%B %d, %Y at %I:%M %p %Z")
    )
}

fn metric_label(change: &ChangeResult) -> &str {
    TrackedMetric::from_key(&change.metric)
        .map(|m| m.label())
        .unwrap_or(change.metric.as_str())
}

fn metric_value(change: &ChangeResult) -> String {
    match TrackedMetric::from_key(&change.metric) {
        Some(metric) if metric.is_percentage() => format!("{:.1}%", change.current),
        _ => format::metric(change.current),
    }
}

fn trend_text(change: &ChangeResult) -> String {
    match change.delta_percent {
        Some(pct) => format!(
            "{} {} vs previous",
            change.trend.arrow(),
            format::signed_percent(pct)
        ),
        None => format!("{} new this period", change.trend.arrow()),
    }
}

fn trend_color(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "#10b981",
        Trend::Down => "#ef4444",
        Trend::Stable => "#6b7280",
    }
}

/// Renders generated markdown to HTML. Raw HTML in the input is shown as
/// text, never passed through.
fn prose_html(markdown: &str) -> String {
    let parser = Parser::new(markdown).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

const CELL: &str = "padding: 8px; border-bottom: 1px solid #e5e7eb;";
const HEAD_CELL: &str =
    "padding: 12px 8px; font-size: 12px; font-weight: 600; color: #6b7280; text-transform: uppercase;";
const SECTION_TITLE: &str = "margin: 0 0 15px 0; font-size: 20px; color: #1f2937;";

pub fn render_html(
    summary: &AnalyticsSummary,
    prose: &str,
    website: &str,
    generated_at: &DateTime<Tz>,
) -> String {
    let website = encode_text(website);
    let period = long_period(summary.period());

    let mut metric_rows = String::new();
    for change in summary.metric_changes() {
        let _ = write!(
            metric_rows,
            r#"<tr><td style="{CELL}">{}</td><td style="{CELL} text-align: right; font-weight: 600;">{}</td><td style="{CELL} text-align: right; color: {};">{}</td></tr>"#,
            metric_label(change),
            metric_value(change),
            trend_color(change.trend),
            encode_text(&trend_text(change)),
        );
    }

    let list = |items: &[String]| -> String {
        items
            .iter()
            .map(|item| format!("<li>{}</li>", encode_text(item)))
            .collect()
    };

    let mut source_rows = String::new();
    for row in summary.top_sources(TABLE_SOURCES) {
        let share = row
            .share_percent
            .map(|s| format!("{s:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            source_rows,
            r#"<tr><td style="{CELL}">{}</td><td style="{CELL} text-align: right;">{}</td><td style="{CELL} text-align: right;">{share}</td></tr>"#,
            encode_text(&row.label),
            format::count(row.users),
        );
    }

    let mut out = String::with_capacity(8 * 1024);
    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Analytics Report - {website}</title>
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; color: #374151; margin: 0; padding: 0; background-color: #f9fafb;">
<div style="max-width: 600px; margin: 0 auto; background-color: #ffffff;">
<div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px 20px; text-align: center;">
<h1 style="margin: 0; font-size: 28px; font-weight: 600;">Analytics Report</h1>
<p style="margin: 10px 0 0 0; font-size: 16px;">{website}</p>
<p style="margin: 5px 0 0 0; font-size: 14px;">{period}</p>
</div>
<div style="padding: 30px 20px; background-color: #f9fafb;">
<h2 style="{SECTION_TITLE}">Key Metrics</h2>
<table style="width: 100%; border-collapse: collapse; background: white;">
<thead><tr><th style="{HEAD_CELL} text-align: left;">Metric</th><th style="{HEAD_CELL} text-align: right;">Value</th><th style="{HEAD_CELL} text-align: right;">Change</th></tr></thead>
<tbody>{metric_rows}</tbody>
</table>
</div>
<div style="padding: 30px 20px;">
<h2 style="{SECTION_TITLE}">Summary</h2>
<div style="background: #f0f9ff; border-left: 4px solid #0ea5e9; padding: 15px; font-size: 14px;">{}</div>
</div>
"#,
        prose_html(prose)
    );

    if !summary.insights().is_empty() {
        let _ = write!(
            out,
            r#"<div style="padding: 0 20px 30px 20px;"><h2 style="{SECTION_TITLE}">Insights</h2><ul>{}</ul></div>
"#,
            list(summary.insights())
        );
    }
    if !summary.recommendations().is_empty() {
        let _ = write!(
            out,
            r#"<div style="padding: 0 20px 30px 20px;"><h2 style="{SECTION_TITLE}">Recommendations</h2><ul>{}</ul></div>
"#,
            list(summary.recommendations())
        );
    }
    if !source_rows.is_empty() {
        let _ = write!(
            out,
            r#"<div style="padding: 30px 20px; background-color: #f9fafb;">
<h2 style="{SECTION_TITLE}">Traffic Sources</h2>
<table style="width: 100%; border-collapse: collapse; background: white;">
<thead><tr><th style="{HEAD_CELL} text-align: left;">Source</th><th style="{HEAD_CELL} text-align: right;">Users</th><th style="{HEAD_CELL} text-align: right;">Share</th></tr></thead>
<tbody>{source_rows}</tbody>
</table>
</div>
"#
        );
    }

    let _ = write!(
        out,
        r#"<div style="padding: 20px; text-align: center; border-top: 1px solid #e5e7eb;">
<p style="margin: 0; font-size: 12px; color: #6b7280;">{}</p>
<p style="margin: 5px 0 0 0; font-size: 12px; color: #9ca3af;">Automated Analytics Report</p>
</div>
</div>
</body>
</html>
"#,
        generated_line(generated_at)
    );
    out
}

pub fn render_text(
    summary: &AnalyticsSummary,
    prose: &str,
    website: &str,
    generated_at: &DateTime<Tz>,
) -> String {
    let mut out = String::new();
    let section = |out: &mut String, title: &str| {
        let _ = write!(out, "\n{RULE}\n{title}\n{RULE}\n\n");
    };

    let _ = writeln!(out, "{DOUBLE_RULE}");
    let _ = writeln!(out, "  ANALYTICS REPORT - {}", website.to_uppercase());
    let _ = writeln!(out, "{DOUBLE_RULE}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Period: {}", long_period(summary.period()));
    let _ = writeln!(out, "Duration: {} days", summary.period_days());

    section(&mut out, "KEY METRICS");
    for change in summary.metric_changes() {
        let _ = writeln!(
            out,
            "{}: {} ({})",
            metric_label(change),
            metric_value(change),
            trend_text(change)
        );
    }

    section(&mut out, "SUMMARY");
    let _ = writeln!(out, "{}", prose.trim());

    if !summary.insights().is_empty() {
        section(&mut out, "INSIGHTS");
        for insight in summary.insights() {
            let _ = writeln!(out, "  - {insight}");
        }
    }
    if !summary.recommendations().is_empty() {
        section(&mut out, "RECOMMENDATIONS");
        for recommendation in summary.recommendations() {
            let _ = writeln!(out, "  - {recommendation}");
        }
    }

    let sources = summary.top_sources(TABLE_SOURCES);
    if !sources.is_empty() {
        section(&mut out, "TRAFFIC SOURCES");
        for (idx, row) in sources.iter().enumerate() {
            let share = row
                .share_percent
                .map(|s| format!(" ({s:.1}%)"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {}. {}\n     Users: {}{share}",
                idx + 1,
                row.label,
                format::count(row.users)
            );
        }
    }

    let _ = write!(
        out,
        "\n{RULE}\n\n{}\nAutomated Analytics Report\n\n{DOUBLE_RULE}",
        generated_line(generated_at)
    );
    out
}

/// Bodies of the operator notice sent when a run fails.
pub fn render_error_notification(error: &str, details: Option<&str>) -> (String, String) {
    let text = format!(
        "ERROR NOTIFICATION\n==================\n\n\
         An error occurred while generating the analytics report.\n\n\
         Error: {error}\n\n\
         Details:\n{}\n\n\
         Please check the application logs for more information.",
        details.unwrap_or("No additional details available")
    );

    let details_html = details
        .map(|d| {
            format!(
                r#"<div style="background-color: #f9f9f9; padding: 15px; margin-top: 15px;"><h3 style="margin: 0 0 10px 0;">Details:</h3><pre style="margin: 0; font-family: monospace; font-size: 12px;">{}</pre></div>"#,
                encode_text(d)
            )
        })
        .unwrap_or_default();
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 600px; margin: 0 auto; padding: 20px;">
<div style="background-color: #fee; border-left: 4px solid #f00; padding: 15px; margin-bottom: 20px;">
<h2 style="margin: 0 0 10px 0; color: #c00;">Error Notification</h2>
<p style="margin: 0;">An error occurred while generating the analytics report.</p>
</div>
<div style="background-color: #f9f9f9; padding: 15px;">
<h3 style="margin: 0 0 10px 0;">Error:</h3>
<p style="margin: 0; font-family: monospace;">{}</p>
</div>
{details_html}
<p style="margin-top: 20px; font-size: 14px; color: #666;">Please check the application logs for more information.</p>
</div>
</body>
</html>
"#,
        encode_text(error)
    );
    (text, html)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use trendpost_core::config::AnalysisConfig;
    use trendpost_core::metrics::{
        AcquisitionEntry, AnalyticsBundle, AudienceMetrics, ConversionMetrics, EngagementMetrics,
        GeographicEntry,
    };
    use trendpost_core::summary::assemble;

    use super::*;

    fn period() -> ReportPeriod {
        ReportPeriod::parse("2026-09-01", "2026-09-30").expect("period")
    }

    fn summary() -> AnalyticsSummary {
        let bundle = |sessions, users, rate| AnalyticsBundle {
            period: period(),
            audience: AudienceMetrics::new(users, users / 2, sessions),
            engagement: EngagementMetrics::new(Some(rate), None, None).expect("engagement"),
            conversions: ConversionMetrics::new([("form_submit", 20)]),
            acquisition: vec![
                AcquisitionEntry::new("google", "organic", 200),
                AcquisitionEntry::new("<script>", "referral", 40),
            ],
            geographic: vec![GeographicEntry::new("Vienna", "Austria", 120)],
        };
        assemble(
            &bundle(1000, 400, 35.0),
            &bundle(800, 420, 55.0),
            period(),
            &AnalysisConfig::default(),
        )
        .expect("summary")
    }

    fn generated_at() -> DateTime<Tz> {
        chrono_tz::Europe::Bratislava
            .with_ymd_and_hms(2026, 10, 1, 9, 0, 0)
            .single()
            .expect("time")
    }

    #[test]
    fn subject_format() {
        assert_eq!(
            subject("[Analytics Report]", "example.com", period()),
            "[Analytics Report] example.com - Sep 01 to Sep 30, 2026"
        );
    }

    #[test]
    fn html_contains_tables_and_escapes_input() {
        let html = render_html(
            &summary(),
            "Traffic grew.\n\n## Key findings\n- Sessions up <b>25%</b>",
            "example.com",
            &generated_at(),
        );
        assert!(html.contains("<h2>Key findings</h2>"));
        assert!(html.contains("&lt;b&gt;25%&lt;/b&gt;"));
        assert!(html.contains("&lt;script&gt;/referral"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(">1,000</td>"));
        assert!(html.contains("↑ +25.0% vs previous"));
        assert!(html.contains("September 01, 2026 - September 30, 2026"));
        assert!(html.contains("Generated on October 01, 2026 at 09:00 AM CEST"));
    }

    #[test]
    fn text_lists_sections_in_order() {
        let text = render_text(&summary(), "Traffic grew.", "example.com", &generated_at());
        assert!(text.contains("ANALYTICS REPORT - EXAMPLE.COM"));
        assert!(text.contains("Duration: 30 days"));
        assert!(text.contains("Sessions: 1,000 (↑ +25.0% vs previous)"));
        assert!(text.contains("Engagement rate: 35.0% (↓ -36.4% vs previous)"));
        assert!(text.contains("  1. google/organic\n     Users: 200 (50.0%)"));
        let metrics = text.find("KEY METRICS").expect("metrics");
        let prose = text.find("Traffic grew.").expect("prose");
        let recs = text.find("RECOMMENDATIONS").expect("recommendations");
        assert!(metrics < prose && prose < recs);
    }

    #[test]
    fn error_notification_escapes_html() {
        let (text, html) = render_error_notification("fetch <failed>", None);
        assert!(text.contains("Error: fetch <failed>"));
        assert!(text.contains("No additional details available"));
        assert!(html.contains("fetch &lt;failed&gt;"));
        assert!(!html.contains("Details:"));
    }
}
